use crate::core::provider::Resource;

use super::StepContext;

pub fn repository(ctx: &StepContext<'_>) -> Resource {
    Resource::ArtifactRepository {
        name: ctx.resources.artifact_repository.clone(),
        location: ctx.settings.region.clone(),
        description: format!("KCIDB images for {}", ctx.resources.namespace),
    }
}

/// Fully-qualified repository path, as accepted by `--docker-repository`.
pub fn repository_path(ctx: &StepContext<'_>) -> String {
    format!(
        "projects/{}/locations/{}/repositories/{}",
        ctx.resources.project, ctx.settings.region, ctx.resources.artifact_repository
    )
}

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    vec![repository(ctx)]
}
