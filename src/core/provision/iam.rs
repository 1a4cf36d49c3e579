use crate::core::provider::{IamTarget, Resource};

use super::{StepContext, service_account_member};

/// Project roles granted to the runtime service account.
pub const RUNTIME_ROLES: [&str; 6] = [
    "roles/pubsub.editor",
    "roles/secretmanager.secretAccessor",
    "roles/cloudsql.client",
    "roles/bigquery.dataEditor",
    "roles/bigquery.jobUser",
    "roles/storage.objectAdmin",
];

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let email = ctx.resources.runtime_service_account();
    let member = service_account_member(&email);
    let mut resources = vec![Resource::ServiceAccount {
        id: ctx.resources.runtime_service_account_id.clone(),
        email,
        display_name: format!("KCIDB runtime ({})", ctx.resources.namespace),
    }];
    resources.extend(RUNTIME_ROLES.iter().map(|role| Resource::IamBinding {
        target: IamTarget::Project,
        member: member.clone(),
        role: (*role).to_string(),
    }));
    resources
}
