//! Per-section resource declarations and the uniform deploy/withdraw/shutdown contract.
//!
//! Each submodule lists the resources of one section in dependency order. Deploy
//! ensures them front to back, withdraw removes them back to front, and shutdown only
//! touches the stateless serving resources.

pub mod artifacts;
pub mod bigquery;
pub mod functions;
pub mod hosting;
pub mod iam;
pub mod psql;
pub mod pubsub;
pub mod run;
pub mod scheduler;
pub mod secrets;
pub mod storage;
pub mod submitters;

use std::path::PathBuf;

use log::debug;

use super::environment::Environment;
use super::events::{Change, ChangeSummary, Event};
use super::namespace::ResourceSet;
use super::plan::StepKind;
use super::provider::{ControlPlane, Resource};
use super::reporter::Reporter;
use super::secrets::SecretManager;
use crate::config::Settings;
use crate::error::Result;

/// Switches that change which resources an installation has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    pub smtp_mocked: bool,
    /// Submitter names granted publish rights on the new-items topic.
    pub submitters: Vec<String>,
    /// Directory holding the function sources.
    pub source: PathBuf,
    pub dashboard_image: String,
}

/// Everything a provisioner needs to describe its resources.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub resources: &'a ResourceSet,
    pub settings: &'a Settings,
    pub environment: &'a Environment,
    pub secrets: &'a SecretManager,
    pub features: &'a Features,
    /// Whether the primary Cloud SQL instance existed before the deploy started.
    pub psql_instance_exists: bool,
}

/// Resources owned by a section, in creation order.
pub fn resources(kind: StepKind, ctx: &StepContext<'_>) -> Vec<Resource> {
    match kind {
        StepKind::Iam => iam::resources(ctx),
        StepKind::Secrets => secrets::resources(ctx),
        StepKind::Psql => psql::resources(ctx),
        StepKind::BigQuery => bigquery::resources(ctx),
        StepKind::Artifacts => artifacts::resources(ctx),
        StepKind::Run => run::resources(ctx),
        StepKind::PubSub => pubsub::resources(ctx),
        StepKind::Storage => storage::resources(ctx),
        StepKind::CloudFunctions => functions::resources(ctx),
        StepKind::Scheduler => scheduler::resources(ctx),
        StepKind::Submitters => submitters::resources(ctx),
    }
}

pub fn deploy(
    kind: StepKind,
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    match kind {
        StepKind::Secrets => secrets::deploy(ctx, control, reporter),
        _ => ensure_all(control, &resources(kind, ctx), reporter),
    }
}

pub fn withdraw(
    kind: StepKind,
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    remove_all(control, &resources(kind, ctx), reporter)
}

/// Stop serving without touching data: delete functions and run services, revoke
/// submitter grants. Other sections are left alone.
pub fn shutdown(
    kind: StepKind,
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    if kind.stops_serving() {
        withdraw(kind, ctx, control, reporter)
    } else {
        Ok(ChangeSummary::default())
    }
}

/// Create `resource` if absent, update it in place if its kind allows.
pub fn ensure(
    control: &mut dyn ControlPlane,
    resource: &Resource,
    reporter: &mut dyn Reporter,
) -> Result<Change> {
    let key = resource.key();
    if !control.exists(resource)? {
        debug!("creating {key}");
        control.create(resource)?;
        reporter.report(Event::ResourceCreated { resource: key });
        return Ok(Change::Created);
    }
    if resource.kind().is_updatable() {
        debug!("updating {key}");
        control.update(resource)?;
        reporter.report(Event::ResourceUpdated { resource: key });
        Ok(Change::Updated)
    } else {
        reporter.report(Event::ResourceUnchanged { resource: key });
        Ok(Change::Unchanged)
    }
}

/// Delete `resource` if present; absence is success.
pub fn remove(
    control: &mut dyn ControlPlane,
    resource: &Resource,
    reporter: &mut dyn Reporter,
) -> Result<Change> {
    let key = resource.key();
    if !control.exists(resource)? {
        reporter.report(Event::ResourceAbsent { resource: key });
        return Ok(Change::Absent);
    }
    debug!("deleting {key}");
    control.delete(resource)?;
    reporter.report(Event::ResourceDeleted { resource: key });
    Ok(Change::Deleted)
}

pub fn ensure_all(
    control: &mut dyn ControlPlane,
    resources: &[Resource],
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    let mut summary = ChangeSummary::default();
    for resource in resources {
        summary.record(ensure(control, resource, reporter)?);
    }
    Ok(summary)
}

/// Remove `resources` in reverse declaration order.
pub fn remove_all(
    control: &mut dyn ControlPlane,
    resources: &[Resource],
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    let mut summary = ChangeSummary::default();
    for resource in resources.iter().rev() {
        summary.record(remove(control, resource, reporter)?);
    }
    Ok(summary)
}

/// IAM member string for a service account email.
pub(crate) fn service_account_member(email: &str) -> String {
    format!("serviceAccount:{email}")
}
