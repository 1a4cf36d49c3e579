use std::path::PathBuf;

use super::diagnostics::Diagnostic;
use super::environment::{EnvFormat, Environment};
use super::events::{ChangeSummary, Event};
use super::plan::{Action, StepReport};
use super::sections::Section;

/// Result wrapper returned by high-level operations.
pub type OperationResult<T> = crate::error::Result<OperationOutput<T>>;

/// Envelope for successful operation outcomes.
#[derive(Debug)]
pub struct OperationOutput<T> {
    /// Primary value produced by the operation.
    pub value: T,
    /// Diagnostics collected while performing the operation.
    pub diagnostics: Vec<Diagnostic>,
    /// Structured events captured during the run.
    pub events: Vec<Event>,
}

impl<T> OperationOutput<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Outcome of `list-sections`.
#[derive(Debug)]
pub struct ListSectionsOutcome {
    pub pattern: String,
    pub sections: Vec<Section>,
}

/// Outcome of `env`.
#[derive(Debug)]
pub struct EnvOutcome {
    pub format: EnvFormat,
    pub environment: Environment,
    pub rendered: String,
    pub settings_path: Option<PathBuf>,
}

/// Outcome of `deploy`, `shutdown` and `withdraw`.
#[derive(Debug)]
pub struct PlanOutcome {
    pub action: Action,
    pub project: String,
    pub namespace: String,
    /// Project prerequisites ensured by a deploy; `None` for other actions.
    pub preflight: Option<ChangeSummary>,
    pub steps: Vec<StepReport>,
}

impl PlanOutcome {
    pub fn totals(&self) -> ChangeSummary {
        let mut totals = ChangeSummary::default();
        for step in &self.steps {
            totals.merge(step.changes);
        }
        totals
    }

    pub fn executed(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| !step.skipped)
    }
}

/// Outcome of `shell`.
#[derive(Debug)]
pub struct ShellOutcome {
    pub program: String,
    pub exit_code: i32,
}
