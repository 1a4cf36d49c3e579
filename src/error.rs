use std::path::PathBuf;

use thiserror::Error;

use crate::core::plan::Action;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    Usage { message: String },
    #[error("Unknown environment format `{format}`; expected `yaml` or `sh`.")]
    UnknownFormat { format: String },
    #[error("Invalid section pattern `{pattern}`: {message}")]
    InvalidSectionPattern { pattern: String, message: String },
    #[error(
        "Invalid project ID `{project}`: expected 6-30 lowercase letters, digits or hyphens, \
         starting with a letter."
    )]
    InvalidProjectId { project: String },
    #[error("Invalid namespace `{namespace}`: {reason}")]
    InvalidNamespace { namespace: String, reason: String },
    #[error("Invalid cost thresholds:\n{message}")]
    InvalidCostThresholds { message: String },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration at {path} is invalid: {message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("The configuration path {path} does not exist or is not readable.")]
    ExplicitConfigMissing { path: PathBuf },
    #[error("Failed to determine the current working directory: {source}")]
    WorkingDirectoryUnavailable {
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read the {role} secret from {path}: {source}")]
    ReadSecretFile {
        role: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Secret `{name}` ({role}) holds no value. Supply it with the matching \
         --*-password-file option."
    )]
    MissingSecret { role: String, name: String },
    #[error("Failed to invoke `{program}`: {source}")]
    ProviderSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}):\n{stderr}")]
    ProviderFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Unexpected output from `{command}`: {message}")]
    ProviderOutput { command: String, message: String },
    #[error("{action} of section `{section}` failed: {source}")]
    StepFailed {
        action: Action,
        section: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("Failed to render the environment document: {source}")]
    RenderEnvironment {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to write temporary file under {path}: {source}")]
    WriteTempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Database proxy `{program}` failed: {message}")]
    ProxyFailed { program: String, message: String },
    #[error("Failed to run shell session `{program}`: {source}")]
    SessionFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Usage and validation errors are raised before any provider call is attempted.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::Usage { .. }
                | Self::UnknownFormat { .. }
                | Self::InvalidSectionPattern { .. }
                | Self::InvalidProjectId { .. }
                | Self::InvalidNamespace { .. }
                | Self::InvalidCostThresholds { .. }
        )
    }
}
