use crate::core::provider::{IamTarget, Resource};

use super::{StepContext, service_account_member};

pub const PUBLISHER_ROLE: &str = "roles/pubsub.publisher";

/// Service account email for a submitter; full emails pass through unchanged.
pub fn submitter_account(name: &str, project: &str) -> String {
    if name.contains('@') {
        name.to_string()
    } else {
        format!("{name}@{project}.iam.gserviceaccount.com")
    }
}

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    ctx.features
        .submitters
        .iter()
        .map(|name| Resource::IamBinding {
            target: IamTarget::Topic(ctx.resources.topics.new.clone()),
            member: service_account_member(&submitter_account(name, &ctx.resources.project)),
            role: PUBLISHER_ROLE.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_are_qualified_with_the_project() {
        assert_eq!(
            submitter_account("kernelci-org", "kernelci-production"),
            "kernelci-org@kernelci-production.iam.gserviceaccount.com"
        );
        assert_eq!(
            submitter_account("bot@other.iam.gserviceaccount.com", "kernelci-production"),
            "bot@other.iam.gserviceaccount.com"
        );
    }
}
