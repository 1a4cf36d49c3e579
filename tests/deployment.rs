use std::error::Error;
use std::path::Path;

use kcidb_cloud::core::events::Event;
use kcidb_cloud::core::options::{EnvOptions, InstallationOptions, PlanOptions};
use kcidb_cloud::core::provider::{Call, InMemoryControlPlane, ResourceKey, ResourceKind};
use kcidb_cloud::core::{EnvFormat, operations};
use regex::Regex;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn Error>>;

const PROJECT: &str = "kernelci-staging";
const NAMESPACE: &str = "kcidb";

fn installation(root: &Path) -> InstallationOptions {
    let mut installation = InstallationOptions::new(PROJECT, NAMESPACE);
    installation.smtp_mocked = true;
    installation.config.search_root = Some(root.to_path_buf());
    installation
}

fn plan(root: &Path) -> PlanOptions {
    PlanOptions::new(installation(root))
}

fn is_preflight(key: &ResourceKey) -> bool {
    matches!(key.kind, ResourceKind::Service | ResourceKind::AppEngine)
}

fn key(kind: ResourceKind, name: &str) -> ResourceKey {
    ResourceKey {
        kind,
        name: name.to_string(),
    }
}

#[test]
fn second_deploy_creates_nothing() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();

    let first = operations::deploy(plan(root.path()), &mut plane, None)?;
    assert!(first.value.totals().created > 0);
    let keys = plane.keys();

    plane.clear_calls();
    let second = operations::deploy(plan(root.path()), &mut plane, None)?;
    assert!(plane.created().is_empty(), "{:?}", plane.created());
    assert_eq!(second.value.totals().created, 0);
    assert_eq!(plane.keys(), keys);
    Ok(())
}

#[test]
fn withdraw_deletes_in_reverse_creation_order() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();

    operations::deploy(plan(root.path()), &mut plane, None)?;
    let mut created: Vec<ResourceKey> = plane
        .created()
        .into_iter()
        .filter(|key| !is_preflight(key))
        .collect();
    created.reverse();

    plane.clear_calls();
    let withdrawn = operations::withdraw(plan(root.path()), &mut plane, None)?;
    assert_eq!(plane.deleted(), created);
    assert_eq!(withdrawn.value.totals().deleted, created.len());
    assert!(plane.keys().iter().all(is_preflight));
    Ok(())
}

#[test]
fn withdraw_of_absent_installation_succeeds() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    let output = operations::withdraw(plan(root.path()), &mut plane, None)?;
    assert!(plane.deleted().is_empty());
    assert_eq!(output.value.totals().deleted, 0);
    assert!(output.value.totals().absent > 0);
    Ok(())
}

#[test]
fn withdraw_twice_is_a_no_op() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    operations::deploy(plan(root.path()), &mut plane, None)?;
    operations::withdraw(plan(root.path()), &mut plane, None)?;
    let remaining = plane.keys();

    plane.clear_calls();
    let again = operations::withdraw(plan(root.path()), &mut plane, None)?;
    assert!(plane.deleted().is_empty(), "{:?}", plane.deleted());
    assert_eq!(again.value.totals().deleted, 0);
    assert_eq!(plane.keys(), remaining);
    Ok(())
}

#[test]
fn shutdown_of_never_deployed_installation_succeeds() -> TestResult {
    let root = TempDir::new()?;
    let mut options = plan(root.path());
    options.submitters = vec!["kernelci-org".to_string()];

    let mut plane = InMemoryControlPlane::new();
    let output = operations::shutdown(options, &mut plane, None)?;
    assert!(plane.deleted().is_empty());
    assert_eq!(output.value.totals().deleted, 0);
    assert!(output.value.totals().absent > 0);
    Ok(())
}

/// Writes a `gcloud`/`bq` stand-in answering every call with NOT_FOUND.
#[cfg(unix)]
fn missing_everything_tool(dir: &Path) -> TestResult<String> {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("gcloud");
    std::fs::write(
        &path,
        "#!/bin/sh\necho 'ERROR: NOT_FOUND: Not found: resource does not exist' >&2\nexit 1\n",
    )?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path.display().to_string())
}

#[cfg(unix)]
#[test]
fn withdraw_through_gcloud_tolerates_missing_parents() -> TestResult {
    let root = TempDir::new()?;
    let tool = missing_everything_tool(root.path())?;
    let mut plane = kcidb_cloud::core::provider::GcloudControlPlane::new(PROJECT)
        .with_programs(tool.clone(), tool);
    let mut options = plan(root.path());
    options.submitters = vec!["kernelci-org".to_string()];

    let output = operations::withdraw(options, &mut plane, None)?;
    assert_eq!(output.value.totals().deleted, 0);
    assert!(output.value.totals().absent > 0);
    Ok(())
}

#[test]
fn section_filter_limits_changes_to_selected_sections() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    let mut options = plan(root.path());
    options.sections = "storage".to_string();

    let output = operations::deploy(options, &mut plane, None)?;
    let kinds: Vec<ResourceKind> = plane
        .created()
        .into_iter()
        .filter(|key| !is_preflight(key))
        .map(|key| key.kind)
        .collect();
    assert_eq!(kinds, vec![ResourceKind::Bucket, ResourceKind::IamBinding]);

    let executed: Vec<&str> = output.value.executed().map(|step| step.section).collect();
    assert_eq!(executed, vec!["storage"]);
    Ok(())
}

#[test]
fn alternation_selects_several_sections() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    let mut options = plan(root.path());
    options.sections = "@(bigquery|pubsub)".to_string();

    let output = operations::deploy(options, &mut plane, None)?;
    let executed: Vec<&str> = output.value.executed().map(|step| step.section).collect();
    assert_eq!(executed, vec!["bigquery", "pubsub"]);
    assert!(plane.contains(&key(ResourceKind::BigQueryDataset, "kcidb_archive")));
    assert!(plane.contains(&key(ResourceKind::Topic, "kcidb_smtp")));
    assert!(!plane.contains(&key(ResourceKind::Bucket, "kernelci-staging-kcidb-cache")));
    Ok(())
}

#[test]
fn negated_group_skips_the_named_section() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    let mut options = plan(root.path());
    options.sections = "!(psql)".to_string();

    let output = operations::deploy(options, &mut plane, None)?;
    let executed: Vec<&str> = output.value.executed().map(|step| step.section).collect();
    assert!(!executed.contains(&"psql"));
    assert!(executed.contains(&"pubsub"));
    assert!(!plane.contains(&key(ResourceKind::PsqlInstance, "kcidb-psql")));
    Ok(())
}

#[test]
fn generated_secrets_survive_redeploy() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();

    operations::deploy(plan(root.path()), &mut plane, None)?;
    let password = Regex::new("^[A-Za-z0-9]{32}$")?;
    let first: Vec<String> = plane
        .secret_versions("kcidb_psql_editor_password")
        .to_vec();
    assert_eq!(first.len(), 1);
    assert!(password.is_match(&first[0]));

    let output = operations::deploy(plan(root.path()), &mut plane, None)?;
    assert_eq!(plane.secret_versions("kcidb_psql_editor_password"), first);
    assert!(output.events.iter().any(|event| matches!(
        event,
        Event::SecretRetained { name, .. } if name == "kcidb_psql_editor_password"
    )));
    Ok(())
}

#[test]
fn secrets_regenerate_when_instance_is_recreated() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    operations::deploy(plan(root.path()), &mut plane, None)?;

    let mut options = plan(root.path());
    options.sections = "psql".to_string();
    operations::withdraw(options, &mut plane, None)?;
    operations::deploy(plan(root.path()), &mut plane, None)?;

    assert_eq!(plane.secret_versions("kcidb_psql_viewer_password").len(), 2);
    Ok(())
}

#[test]
fn supplied_smtp_password_is_stored() -> TestResult {
    let root = TempDir::new()?;
    let password_file = root.path().join("smtp-password");
    std::fs::write(&password_file, "hunter2\n")?;

    let mut options = plan(root.path());
    options.installation.smtp_mocked = false;
    options.secret_files.smtp_password = Some(password_file);

    let mut plane = InMemoryControlPlane::new();
    operations::deploy(options, &mut plane, None)?;
    assert_eq!(plane.secret_versions("kcidb_smtp_password"), ["hunter2"]);
    assert!(!plane.contains(&key(ResourceKind::Topic, "kcidb_smtp")));
    Ok(())
}

#[test]
fn supplied_superuser_password_reaches_existing_instance() -> TestResult {
    let root = TempDir::new()?;
    let first_file = root.path().join("psql-password");
    std::fs::write(&first_file, "initial\n")?;
    let mut options = plan(root.path());
    options.secret_files.psql_superuser = Some(first_file);

    let mut plane = InMemoryControlPlane::new();
    operations::deploy(options, &mut plane, None)?;
    // A new instance takes the password at creation.
    assert!(!plane.calls().iter().any(|call| matches!(call, Call::ResetPassword(_))));

    let rotated_file = root.path().join("psql-password-rotated");
    std::fs::write(&rotated_file, "rotated\n")?;
    let mut options = plan(root.path());
    options.secret_files.psql_superuser = Some(rotated_file);
    plane.clear_calls();
    let output = operations::deploy(options, &mut plane, None)?;

    assert!(plane
        .calls()
        .contains(&Call::ResetPassword("kcidb-psql/postgres".to_string())));
    assert_eq!(plane.password("kcidb-psql", "postgres"), Some("rotated"));
    assert_eq!(
        plane.secret_versions("kcidb_psql_superuser_password"),
        ["initial", "rotated"]
    );
    assert!(output.events.iter().any(|event| matches!(
        event,
        Event::PasswordReset { user, .. } if user == "postgres"
    )));
    Ok(())
}

#[test]
fn pgpass_secret_follows_editor_password() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    operations::deploy(plan(root.path()), &mut plane, None)?;

    let editor = plane.secret_versions("kcidb_psql_editor_password").to_vec();
    let expected = format!("*:*:*:kcidb_editor:{}\n", editor[0]);
    assert_eq!(plane.secret_versions("kcidb_psql_pgpass"), [expected.clone()]);

    operations::deploy(plan(root.path()), &mut plane, None)?;
    assert_eq!(plane.secret_versions("kcidb_psql_pgpass"), [expected]);

    let env = operations::env(EnvOptions {
        installation: installation(root.path()),
        format: EnvFormat::Yaml,
    })?;
    let parsed: serde_yaml::Mapping = serde_yaml::from_str(&env.value.rendered)?;
    assert_eq!(
        parsed.get(serde_yaml::Value::from("KCIDB_PSQL_PGPASS_SECRET")),
        Some(&serde_yaml::Value::from("kcidb_psql_pgpass"))
    );
    Ok(())
}

#[test]
fn missing_smtp_password_fails_the_secrets_step() -> TestResult {
    let root = TempDir::new()?;
    let mut options = plan(root.path());
    options.installation.smtp_mocked = false;

    let mut plane = InMemoryControlPlane::new();
    let err = operations::deploy(options, &mut plane, None).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("section `secrets`"), "{message}");
    assert!(message.contains("kcidb_smtp_password"), "{message}");
    assert!(!plane.contains(&key(ResourceKind::PsqlInstance, "kcidb-psql")));
    Ok(())
}

#[test]
fn test_installation_adds_overlay_databases() -> TestResult {
    let root = TempDir::new()?;
    let mut options = plan(root.path());
    options.installation.test = true;

    let mut plane = InMemoryControlPlane::new();
    operations::deploy(options, &mut plane, None)?;
    for name in [
        "kcidb-psql/kcidb_op",
        "kcidb-psql/kcidb_op_clean_test",
        "kcidb-psql/kcidb_op_empty_test",
    ] {
        assert!(plane.contains(&key(ResourceKind::PsqlDatabase, name)), "{name}");
    }
    for name in ["kcidb_archive_clean_test", "kcidb_archive_empty_test"] {
        assert!(plane.contains(&key(ResourceKind::BigQueryDataset, name)), "{name}");
    }
    Ok(())
}

#[test]
fn provider_failure_names_the_section() -> TestResult {
    let root = TempDir::new()?;
    let mut plane = InMemoryControlPlane::new();
    plane.fail_on(Call::Create(key(ResourceKind::Topic, "kcidb_updated")));

    let err = operations::deploy(plan(root.path()), &mut plane, None).unwrap_err();
    assert!(err.to_string().starts_with("deploy of section `pubsub` failed"), "{err}");
    // Steps after the failing one never ran.
    assert!(plane
        .created()
        .iter()
        .all(|key| key.kind != ResourceKind::Function));
    Ok(())
}

#[test]
fn shutdown_keeps_data() -> TestResult {
    let root = TempDir::new()?;
    let mut options = plan(root.path());
    options.submitters = vec!["kernelci-org".to_string()];

    let mut plane = InMemoryControlPlane::new();
    operations::deploy(options.clone(), &mut plane, None)?;
    plane.clear_calls();
    operations::shutdown(options, &mut plane, None)?;

    let deleted_kinds: Vec<ResourceKind> = plane.deleted().into_iter().map(|k| k.kind).collect();
    assert!(deleted_kinds.contains(&ResourceKind::Function));
    assert!(deleted_kinds.contains(&ResourceKind::RunService));
    assert!(deleted_kinds.contains(&ResourceKind::IamBinding));
    assert!(plane.contains(&key(ResourceKind::PsqlInstance, "kcidb-psql")));
    assert!(plane.contains(&key(ResourceKind::BigQueryDataset, "kcidb_archive")));
    assert!(plane.contains(&key(ResourceKind::Topic, "kcidb_new")));
    Ok(())
}

#[test]
fn env_yaml_omits_unset_optional_keys() -> TestResult {
    let root = TempDir::new()?;
    let mut installation = installation(root.path());
    installation.smtp_mocked = false;

    let output = operations::env(EnvOptions {
        installation,
        format: EnvFormat::Yaml,
    })?;
    let parsed: serde_yaml::Mapping = serde_yaml::from_str(&output.value.rendered)?;
    let has = |key: &str| parsed.contains_key(serde_yaml::Value::from(key));
    assert!(has("KCIDB_PROJECT_ID"));
    assert!(has("KCIDB_SMTP_PASSWORD_SECRET"));
    for absent in [
        "KCIDB_SMTP_TOPIC",
        "KCIDB_EXTRA_CC",
        "KCIDB_COST_THRESHOLDS",
        "KCIDB_CLEAN_TEST_DATABASE",
    ] {
        assert!(!has(absent), "{absent}");
    }
    Ok(())
}

#[test]
fn env_shell_output_quotes_values() -> TestResult {
    let root = TempDir::new()?;
    let mut installation = installation(root.path());
    installation.cost_thresholds = Some(r#"[[100, "kcidb_it's_over"]]"#.to_string());

    let output = operations::env(EnvOptions {
        installation,
        format: EnvFormat::Shell,
    })?;
    let export = Regex::new(r"^export [A-Z_]+='.*'$")?;
    for line in output.value.rendered.lines() {
        assert!(export.is_match(line), "{line}");
    }
    assert!(output.value.rendered.contains(r"'\''"));
    Ok(())
}
