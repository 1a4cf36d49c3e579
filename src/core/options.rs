use std::path::PathBuf;

use crate::core::environment::{DEFAULT_LOG_LEVEL, EnvFormat};
use crate::core::sections::DEFAULT_SECTION_PATTERN;
use crate::core::shell::{DEFAULT_PROXY_PORT, DEFAULT_PROXY_PROGRAM};

/// Source used when resolving the settings file.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// Search for `kcidb-cloud.toml` by walking up from the working directory; fall
    /// back to built-in defaults when none is found.
    #[default]
    Discover,
    /// Use an explicit path, which must exist.
    Explicit(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    pub source: ConfigSource,
    /// Override for the discovery root (defaults to the process CWD).
    pub search_root: Option<PathBuf>,
}

impl ConfigLoadOptions {
    pub fn explicit(path: PathBuf) -> Self {
        Self {
            source: ConfigSource::Explicit(path),
            search_root: None,
        }
    }

    pub fn discover() -> Self {
        Self::default()
    }
}

/// Identity of an installation plus the flags shaping its environment.
#[derive(Debug, Clone)]
pub struct InstallationOptions {
    pub project: String,
    pub namespace: String,
    /// Add the clean/empty test database overlays.
    pub test: bool,
    /// Replace the SMTP relay with a Pub/Sub topic and subscription.
    pub smtp_mocked: bool,
    pub smtp_to_addrs: Option<String>,
    pub extra_cc: Option<String>,
    /// Raw JSON; validated before any provider call.
    pub cost_thresholds: Option<String>,
    pub heavy_asserts: bool,
    pub updated_publish: bool,
    pub log_level: String,
    pub config: ConfigLoadOptions,
}

impl InstallationOptions {
    pub fn new(project: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            namespace: namespace.into(),
            test: false,
            smtp_mocked: false,
            smtp_to_addrs: None,
            extra_cc: None,
            cost_thresholds: None,
            heavy_asserts: false,
            updated_publish: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            config: ConfigLoadOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvOptions {
    pub installation: InstallationOptions,
    pub format: EnvFormat,
}

#[derive(Debug, Clone)]
pub struct ShellOptions {
    pub installation: InstallationOptions,
    /// Program and arguments; empty means `$SHELL`.
    pub command: Vec<String>,
    pub proxy_port: u16,
    pub proxy_program: String,
}

impl ShellOptions {
    pub fn new(installation: InstallationOptions) -> Self {
        Self {
            installation,
            command: Vec::new(),
            proxy_port: DEFAULT_PROXY_PORT,
            proxy_program: DEFAULT_PROXY_PROGRAM.to_string(),
        }
    }
}

/// Operator-supplied secret values, by file path (`-` for stdin).
#[derive(Debug, Clone, Default)]
pub struct SecretFiles {
    pub psql_superuser: Option<PathBuf>,
    pub smtp_password: Option<PathBuf>,
}

/// Options shared by `deploy`, `shutdown` and `withdraw`.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub installation: InstallationOptions,
    /// Glob selecting the sections to act on.
    pub sections: String,
    pub submitters: Vec<String>,
    /// Directory with the function sources to upload.
    pub source: PathBuf,
    /// Overrides the dashboard image from the settings file.
    pub dashboard_image: Option<String>,
    pub secret_files: SecretFiles,
}

impl PlanOptions {
    pub fn new(installation: InstallationOptions) -> Self {
        Self {
            installation,
            sections: DEFAULT_SECTION_PATTERN.to_string(),
            submitters: Vec::new(),
            source: PathBuf::from("."),
            dashboard_image: None,
            secret_files: SecretFiles::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListSectionsOptions {
    pub pattern: String,
}

impl Default for ListSectionsOptions {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_SECTION_PATTERN.to_string(),
        }
    }
}
