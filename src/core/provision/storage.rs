use crate::core::provider::{IamTarget, Resource};

use super::StepContext;

/// Cached objects are served publicly through the redirector.
pub const PUBLIC_MEMBER: &str = "allUsers";
pub const PUBLIC_ROLE: &str = "roles/storage.objectViewer";

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let bucket = &ctx.resources.cache_bucket;
    vec![
        Resource::Bucket {
            name: bucket.clone(),
            location: ctx.settings.region.clone(),
        },
        Resource::IamBinding {
            target: IamTarget::Bucket(bucket.clone()),
            member: PUBLIC_MEMBER.to_string(),
            role: PUBLIC_ROLE.to_string(),
        },
    ]
}
