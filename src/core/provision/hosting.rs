//! Project-level prerequisites ensured before any section of a deploy.
//!
//! These are not gated by section selection and are never withdrawn: the App Engine
//! application cannot be deleted, and enabled APIs are shared project state.

use crate::config::Settings;
use crate::core::events::ChangeSummary;
use crate::core::provider::{ControlPlane, Resource};
use crate::core::reporter::Reporter;
use crate::error::Result;

use super::ensure;

/// Provider APIs an installation relies on.
pub const REQUIRED_SERVICES: [&str; 12] = [
    "appengine.googleapis.com",
    "artifactregistry.googleapis.com",
    "bigquery.googleapis.com",
    "cloudbuild.googleapis.com",
    "cloudfunctions.googleapis.com",
    "cloudscheduler.googleapis.com",
    "iam.googleapis.com",
    "pubsub.googleapis.com",
    "run.googleapis.com",
    "secretmanager.googleapis.com",
    "sqladmin.googleapis.com",
    "storage.googleapis.com",
];

pub fn resources(settings: &Settings) -> Vec<Resource> {
    let mut resources = vec![Resource::AppEngine {
        region: settings.region.clone(),
    }];
    resources.extend(REQUIRED_SERVICES.iter().map(|name| Resource::Service {
        name: (*name).to_string(),
    }));
    resources
}

/// Create the App Engine application once and enable the required services.
pub fn prepare(
    settings: &Settings,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    let mut summary = ChangeSummary::default();
    for resource in resources(settings) {
        summary.record(ensure(control, &resource, reporter)?);
    }
    Ok(summary)
}
