use crate::core::provider::{Resource, RunServiceSpec};

use super::StepContext;

/// The Grafana dashboard, reading the operational database as the viewer user.
pub fn dashboard(ctx: &StepContext<'_>) -> Resource {
    let resources = ctx.resources;
    let connection = resources.psql_connection_name(&ctx.settings.region);
    let env = [
        ("GF_DATABASE_TYPE", "postgres".to_string()),
        ("GF_DATABASE_HOST", format!("/cloudsql/{connection}")),
        ("GF_DATABASE_NAME", resources.psql.database.clone()),
        ("GF_DATABASE_USER", resources.psql.viewer.clone()),
        ("GF_AUTH_ANONYMOUS_ENABLED", "true".to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();

    Resource::RunService(Box::new(RunServiceSpec {
        name: resources.dashboard_service.clone(),
        region: ctx.settings.region.clone(),
        image: ctx.features.dashboard_image.clone(),
        service_account: resources.runtime_service_account(),
        cloudsql_instance: connection,
        env,
        secret_env: vec![(
            "GF_DATABASE_PASSWORD".to_string(),
            resources.secrets.psql_viewer.clone(),
        )],
    }))
}

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    vec![dashboard(ctx)]
}
