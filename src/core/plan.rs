//! Ordered provisioning plans and their executor.
//!
//! A plan is a vector of steps, one per section. Deploy runs the sections in
//! dependency order, withdraw runs the same vector reversed, and shutdown is the
//! reversed vector restricted to the sections that serve traffic.

use std::fmt;

use log::info;

use super::events::{ChangeSummary, Event};
use super::provider::ControlPlane;
use super::provision::{self, StepContext};
use super::reporter::Reporter;
use super::sections::{self, Section, SectionFilter};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Shutdown,
    Withdraw,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Shutdown => "shutdown",
            Action::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of provisioning sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Iam,
    Secrets,
    Psql,
    BigQuery,
    Artifacts,
    Run,
    PubSub,
    Storage,
    CloudFunctions,
    Scheduler,
    Submitters,
}

/// Sections in the order a deploy creates them.
pub const DEPLOY_ORDER: [StepKind; 11] = [
    StepKind::Iam,
    StepKind::Secrets,
    StepKind::Psql,
    StepKind::BigQuery,
    StepKind::Artifacts,
    StepKind::Run,
    StepKind::PubSub,
    StepKind::Storage,
    StepKind::CloudFunctions,
    StepKind::Scheduler,
    StepKind::Submitters,
];

impl StepKind {
    pub fn section(self) -> Section {
        match self {
            StepKind::Iam => sections::IAM,
            StepKind::Secrets => sections::SECRETS,
            StepKind::Psql => sections::PSQL,
            StepKind::BigQuery => sections::BIGQUERY,
            StepKind::Artifacts => sections::ARTIFACTS,
            StepKind::Run => sections::RUN,
            StepKind::PubSub => sections::PUBSUB,
            StepKind::Storage => sections::STORAGE,
            StepKind::CloudFunctions => sections::CLOUD_FUNCTIONS,
            StepKind::Scheduler => sections::SCHEDULER,
            StepKind::Submitters => sections::SUBMITTERS,
        }
    }

    /// Sections a shutdown acts on: serving resources and inbound grants.
    pub fn stops_serving(self) -> bool {
        matches!(
            self,
            StepKind::Run | StepKind::CloudFunctions | StepKind::Submitters
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub kind: StepKind,
}

impl Step {
    pub fn section(&self) -> &'static str {
        self.kind.section().name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    action: Action,
    steps: Vec<Step>,
}

impl Plan {
    pub fn for_action(action: Action) -> Self {
        let kinds: Vec<StepKind> = match action {
            Action::Deploy => DEPLOY_ORDER.to_vec(),
            Action::Withdraw => DEPLOY_ORDER.iter().rev().copied().collect(),
            Action::Shutdown => DEPLOY_ORDER
                .iter()
                .rev()
                .copied()
                .filter(|kind| kind.stops_serving())
                .collect(),
        };
        Self {
            action,
            steps: kinds
                .into_iter()
                .map(|kind| Step { action, kind })
                .collect(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the plan, stopping at the first failing step.
    ///
    /// Steps whose section is not selected by `filter` are reported as skipped and
    /// make no provider calls.
    pub fn execute(
        &self,
        filter: &SectionFilter,
        ctx: &StepContext<'_>,
        control: &mut dyn ControlPlane,
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let section = step.section();
            if !filter.is_selected(section) {
                reporter.report(Event::StepSkipped {
                    action: step.action,
                    section,
                });
                reports.push(StepReport {
                    section,
                    skipped: true,
                    changes: ChangeSummary::default(),
                });
                continue;
            }

            info!("{} {section}", step.action);
            reporter.report(Event::StepStarted {
                action: step.action,
                section,
            });
            let result = match step.action {
                Action::Deploy => provision::deploy(step.kind, ctx, control, reporter),
                Action::Withdraw => provision::withdraw(step.kind, ctx, control, reporter),
                Action::Shutdown => provision::shutdown(step.kind, ctx, control, reporter),
            };
            let changes = result.map_err(|source| Error::StepFailed {
                action: step.action,
                section,
                source: Box::new(source),
            })?;
            reporter.report(Event::StepCompleted {
                action: step.action,
                section,
                changes,
            });
            reports.push(StepReport {
                section,
                skipped: false,
                changes,
            });
        }
        Ok(reports)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub section: &'static str,
    pub skipped: bool,
    pub changes: ChangeSummary,
}
