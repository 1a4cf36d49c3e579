use crate::core::events::{ChangeSummary, Event};
use crate::core::namespace::PSQL_SUPERUSER;
use crate::core::provider::{ControlPlane, Resource};
use crate::core::reporter::Reporter;
use crate::core::secrets::SecretRole;
use crate::error::Result;

use super::{StepContext, ensure_all};

/// Roles whose values are generated when the operator does not supply them.
pub const GENERATED_ROLES: [SecretRole; 3] = [
    SecretRole::PsqlSuperuser,
    SecretRole::PsqlEditor,
    SecretRole::PsqlViewer,
];

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    ctx.secrets
        .bindings()
        .iter()
        .map(|binding| Resource::Secret {
            name: binding.name.clone(),
        })
        .collect()
}

/// Create the secret containers, store supplied values, generate database
/// passwords for a new Cloud SQL instance, then check every bound secret has a value.
///
/// A superuser password supplied for an existing instance is also set on the
/// instance, and the pgpass secret follows the editor password.
pub fn deploy(
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<ChangeSummary> {
    let summary = ensure_all(control, &resources(ctx), reporter)?;
    ctx.secrets.apply_supplied(control, reporter)?;
    reset_supplied_superuser(ctx, control, reporter)?;
    for role in GENERATED_ROLES {
        if ctx.secrets.binding(role).is_some() {
            ctx.secrets
                .generate_if_absent(control, role, ctx.psql_instance_exists, reporter)?;
        }
    }
    store_pgpass(ctx, control, reporter)?;
    for binding in ctx.secrets.bindings() {
        ctx.secrets.require(control, binding.role)?;
    }
    Ok(summary)
}

/// A new instance takes the superuser password at creation; an existing one
/// only learns it here.
fn reset_supplied_superuser(
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let Some(binding) = ctx.secrets.binding(SecretRole::PsqlSuperuser) else {
        return Ok(());
    };
    if !ctx.psql_instance_exists || !binding.is_supplied() {
        return Ok(());
    }
    let instance = &ctx.resources.psql.instance;
    control.reset_password(instance, PSQL_SUPERUSER, &binding.name)?;
    reporter.report(Event::PasswordReset {
        instance: instance.clone(),
        user: PSQL_SUPERUSER.to_string(),
    });
    Ok(())
}

fn store_pgpass(
    ctx: &StepContext<'_>,
    control: &mut dyn ControlPlane,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    if ctx.secrets.binding(SecretRole::PsqlPgpass).is_none() {
        return Ok(());
    }
    let password = ctx.secrets.value(control, SecretRole::PsqlEditor)?;
    let line = pgpass_line(&ctx.resources.psql.editor, &password);
    ctx.secrets
        .store_derived(control, SecretRole::PsqlPgpass, &line, reporter)?;
    Ok(())
}

/// `.pgpass` entry matching any host, port and database for `user`.
pub fn pgpass_line(user: &str, password: &str) -> String {
    fn escape(field: &str) -> String {
        field.replace('\\', "\\\\").replace(':', "\\:")
    }
    format!("*:*:*:{}:{}\n", escape(user), escape(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgpass_fields_escape_separators() {
        assert_eq!(pgpass_line("kcidb_editor", "abc"), "*:*:*:kcidb_editor:abc\n");
        assert_eq!(pgpass_line("kcidb_editor", r"a:b\c"), "*:*:*:kcidb_editor:a\\:b\\\\c\n");
    }
}
