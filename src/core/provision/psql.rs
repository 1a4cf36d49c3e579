use crate::config::Settings;
use crate::core::namespace::ResourceSet;
use crate::core::provider::{ControlPlane, Resource};
use crate::error::Result;

use super::StepContext;

pub fn instance(resources: &ResourceSet, settings: &Settings) -> Resource {
    Resource::PsqlInstance {
        name: resources.psql.instance.clone(),
        region: settings.region.clone(),
        version: settings.psql.version.clone(),
        tier: settings.psql.tier.clone(),
        root_password_secret: resources.secrets.psql_superuser.clone(),
    }
}

/// Whether the primary instance exists; decides if database passwords are generated.
pub fn instance_exists(
    resources: &ResourceSet,
    settings: &Settings,
    control: &mut dyn ControlPlane,
) -> Result<bool> {
    control.exists(&instance(resources, settings))
}

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let names = &ctx.resources.psql;
    let database = |name: &str| Resource::PsqlDatabase {
        instance: names.instance.clone(),
        name: name.to_string(),
    };
    let user = |name: &str, password_secret: &str| Resource::PsqlUser {
        instance: names.instance.clone(),
        name: name.to_string(),
        password_secret: password_secret.to_string(),
    };

    let mut resources = vec![
        instance(ctx.resources, ctx.settings),
        database(&names.database),
    ];
    if let Some(test) = &ctx.resources.test {
        resources.extend(
            test.overlays()
                .iter()
                .map(|overlay| database(&overlay.psql_database)),
        );
    }
    let secrets = &ctx.resources.secrets;
    resources.push(user(&names.editor, &secrets.psql_editor));
    resources.push(user(&names.viewer, &secrets.psql_viewer));
    resources
}
