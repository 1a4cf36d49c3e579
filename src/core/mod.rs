//! Core library API surface: naming, environment compilation, provisioning plans.

pub mod diagnostics;
pub mod events;
pub mod options;
pub mod outcome;
pub mod reporter;

pub mod environment;
pub mod namespace;
pub mod operations;
pub mod plan;
pub mod provider;
pub mod provision;
pub mod secrets;
pub mod sections;
pub mod shell;
pub mod thresholds;

pub use diagnostics::{Diagnostic, Severity};
pub use environment::{EnvFormat, Environment, EnvironmentFlags};
pub use events::{Change, ChangeSummary, Event};
pub use operations::{deploy, env, list_sections, shell, shutdown, withdraw};
pub use options::{
    ConfigLoadOptions, ConfigSource, EnvOptions, InstallationOptions, ListSectionsOptions,
    PlanOptions, SecretFiles, ShellOptions,
};
pub use outcome::{
    EnvOutcome, ListSectionsOutcome, OperationOutput, OperationResult, PlanOutcome, ShellOutcome,
};
pub use plan::{Action, Plan, StepReport};
pub use provider::{ControlPlane, GcloudControlPlane, InMemoryControlPlane};
pub use reporter::Reporter;
