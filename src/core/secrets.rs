//! Bindings between logical secret roles and Secret Manager secrets.
//!
//! A role is bound to an external secret name with [`SecretManager::ensure`]. Values
//! either come from the operator ([`SecretManager::from_file`]) or are generated once,
//! when the resource consuming them is first created. Existing values are never
//! rotated by a deploy.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::debug;
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::events::Event;
use super::provider::ControlPlane;
use super::reporter::Reporter;
use crate::error::{Error, Result};

pub const GENERATED_SECRET_LEN: usize = 32;

/// Path argument meaning "read the value from standard input".
pub const STDIN_PATH: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecretRole {
    PsqlSuperuser,
    PsqlEditor,
    PsqlViewer,
    /// `.pgpass` line for the editor user, derived from its password.
    PsqlPgpass,
    SmtpPassword,
}

impl SecretRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SecretRole::PsqlSuperuser => "PostgreSQL superuser password",
            SecretRole::PsqlEditor => "PostgreSQL editor password",
            SecretRole::PsqlViewer => "PostgreSQL viewer password",
            SecretRole::PsqlPgpass => "PostgreSQL pgpass file",
            SecretRole::SmtpPassword => "SMTP password",
        }
    }
}

impl fmt::Display for SecretRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operator-supplied value was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    File(PathBuf),
    Stdin,
}

#[derive(Clone, PartialEq, Eq)]
struct SuppliedValue {
    source: SecretSource,
    value: String,
}

impl fmt::Debug for SuppliedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppliedValue")
            .field("source", &self.source)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBinding {
    pub role: SecretRole,
    pub project: String,
    pub name: String,
    supplied: Option<SuppliedValue>,
}

impl SecretBinding {
    pub fn is_supplied(&self) -> bool {
        self.supplied.is_some()
    }

    pub fn source(&self) -> Option<&SecretSource> {
        self.supplied.as_ref().map(|supplied| &supplied.source)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecretManager {
    bindings: Vec<SecretBinding>,
}

impl SecretManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `role` to the secret `name`; rebinding replaces the previous name.
    pub fn ensure(&mut self, role: SecretRole, project: &str, name: &str) {
        match self.bindings.iter_mut().find(|binding| binding.role == role) {
            Some(binding) => {
                binding.project = project.to_string();
                binding.name = name.to_string();
            }
            None => self.bindings.push(SecretBinding {
                role,
                project: project.to_string(),
                name: name.to_string(),
                supplied: None,
            }),
        }
    }

    /// Mark `role` as operator-supplied, reading its value from `path` now.
    ///
    /// `-` reads standard input. A single trailing newline is stripped.
    pub fn from_file(&mut self, role: SecretRole, path: &Path) -> Result<()> {
        let read_error = |source: io::Error| Error::ReadSecretFile {
            role: role.to_string(),
            path: path.to_path_buf(),
            source,
        };
        if path == Path::new(STDIN_PATH) {
            let mut value = String::new();
            io::stdin()
                .read_to_string(&mut value)
                .map_err(read_error)?;
            self.supply(role, SecretSource::Stdin, value)
        } else {
            let value = fs::read_to_string(path).map_err(read_error)?;
            self.supply(role, SecretSource::File(path.to_path_buf()), value)
        }
    }

    /// Mark `role` as operator-supplied with a value read from `reader`.
    pub fn from_reader(
        &mut self,
        role: SecretRole,
        source: SecretSource,
        mut reader: impl Read,
    ) -> Result<()> {
        let mut value = String::new();
        reader
            .read_to_string(&mut value)
            .map_err(|err| Error::ReadSecretFile {
                role: role.to_string(),
                path: match &source {
                    SecretSource::File(path) => path.clone(),
                    SecretSource::Stdin => PathBuf::from(STDIN_PATH),
                },
                source: err,
            })?;
        self.supply(role, source, value)
    }

    fn supply(&mut self, role: SecretRole, source: SecretSource, mut value: String) -> Result<()> {
        if value.ends_with('\n') {
            value.pop();
            if value.ends_with('\r') {
                value.pop();
            }
        }
        if value.is_empty() {
            return Err(Error::usage(format!("The supplied {role} is empty.")));
        }
        let binding = self
            .bindings
            .iter_mut()
            .find(|binding| binding.role == role)
            .ok_or_else(|| {
                Error::usage(format!(
                    "The {role} is not used by this installation; drop the option supplying it."
                ))
            })?;
        binding.supplied = Some(SuppliedValue { source, value });
        Ok(())
    }

    pub fn binding(&self, role: SecretRole) -> Option<&SecretBinding> {
        self.bindings.iter().find(|binding| binding.role == role)
    }

    pub fn bindings(&self) -> &[SecretBinding] {
        &self.bindings
    }

    fn bound(&self, role: SecretRole) -> Result<&SecretBinding> {
        self.binding(role).ok_or_else(|| Error::MissingSecret {
            role: role.to_string(),
            name: "<unbound>".to_string(),
        })
    }

    /// Store every operator-supplied value as a new secret version.
    pub fn apply_supplied(
        &self,
        control: &mut dyn ControlPlane,
        reporter: &mut dyn Reporter,
    ) -> Result<usize> {
        let mut stored = 0;
        for binding in &self.bindings {
            let Some(supplied) = &binding.supplied else {
                continue;
            };
            control.add_secret_version(&binding.name, &supplied.value)?;
            reporter.report(Event::SecretStored {
                role: binding.role,
                name: binding.name.clone(),
            });
            stored += 1;
        }
        Ok(stored)
    }

    /// Generate and store a value for `role` unless the consuming resource exists.
    ///
    /// Returns whether a version was written. Supplied roles are never generated.
    pub fn generate_if_absent(
        &self,
        control: &mut dyn ControlPlane,
        role: SecretRole,
        resource_exists: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<bool> {
        let binding = self.bound(role)?;
        if resource_exists || binding.is_supplied() {
            debug!("keeping existing value of secret {}", binding.name);
            reporter.report(Event::SecretRetained {
                role,
                name: binding.name.clone(),
            });
            return Ok(false);
        }
        control.add_secret_version(&binding.name, &generate_value())?;
        reporter.report(Event::SecretGenerated {
            role,
            name: binding.name.clone(),
        });
        Ok(true)
    }

    /// Store `value` for a role computed from other secrets, unless it is current.
    pub fn store_derived(
        &self,
        control: &mut dyn ControlPlane,
        role: SecretRole,
        value: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<bool> {
        let binding = self.bound(role)?;
        let name = binding.name.clone();
        if control.secret_has_value(&name)? && control.secret_value(&name)? == value {
            reporter.report(Event::SecretRetained { role, name });
            return Ok(false);
        }
        control.add_secret_version(&name, value)?;
        reporter.report(Event::SecretStored { role, name });
        Ok(true)
    }

    /// Latest value of the secret bound to `role`.
    pub fn value(&self, control: &mut dyn ControlPlane, role: SecretRole) -> Result<String> {
        self.require(control, role)?;
        control.secret_value(&self.bound(role)?.name)
    }

    /// Fail unless the secret bound to `role` holds a value.
    pub fn require(&self, control: &mut dyn ControlPlane, role: SecretRole) -> Result<()> {
        let binding = self.bound(role)?;
        if control.secret_has_value(&binding.name)? {
            Ok(())
        } else {
            Err(Error::MissingSecret {
                role: role.to_string(),
                name: binding.name.clone(),
            })
        }
    }
}

fn generate_value() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{Call, InMemoryControlPlane, Resource};
    use tempfile::tempdir;

    const NAME: &str = "kcidb_psql_editor_password";

    fn manager() -> SecretManager {
        let mut secrets = SecretManager::new();
        secrets.ensure(SecretRole::PsqlEditor, "kernelci-production", NAME);
        secrets
    }

    fn plane() -> InMemoryControlPlane {
        let mut plane = InMemoryControlPlane::new();
        plane.seed(Resource::Secret {
            name: NAME.to_string(),
        });
        plane
    }

    fn writes(plane: &InMemoryControlPlane) -> usize {
        plane
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::AddSecretVersion(_)))
            .count()
    }

    #[test]
    fn existing_resource_suppresses_generation() {
        let secrets = manager();
        let mut plane = plane();
        let mut events: Vec<Event> = Vec::new();
        let written = secrets
            .generate_if_absent(&mut plane, SecretRole::PsqlEditor, true, &mut events)
            .unwrap();
        assert!(!written);
        assert_eq!(writes(&plane), 0);
        assert!(matches!(events[0], Event::SecretRetained { .. }));
    }

    #[test]
    fn missing_resource_generates_exactly_one_version() {
        let secrets = manager();
        let mut plane = plane();
        let written = secrets
            .generate_if_absent(&mut plane, SecretRole::PsqlEditor, false, &mut ())
            .unwrap();
        assert!(written);
        assert_eq!(writes(&plane), 1);
        let versions = plane.secret_versions(NAME);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].len(), GENERATED_SECRET_LEN);
        assert!(versions[0].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn supplied_value_is_stored_and_never_generated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("editor.txt");
        fs::write(&path, "s3cr3t\n").unwrap();

        let mut secrets = manager();
        secrets.from_file(SecretRole::PsqlEditor, &path).unwrap();
        let mut plane = plane();
        assert_eq!(secrets.apply_supplied(&mut plane, &mut ()).unwrap(), 1);
        assert!(
            !secrets
                .generate_if_absent(&mut plane, SecretRole::PsqlEditor, false, &mut ())
                .unwrap()
        );
        assert_eq!(plane.secret_versions(NAME), &["s3cr3t".to_string()]);
    }

    #[test]
    fn require_fails_on_empty_secret() {
        let secrets = manager();
        let mut plane = plane();
        match secrets.require(&mut plane, SecretRole::PsqlEditor) {
            Err(Error::MissingSecret { name, .. }) => assert_eq!(name, NAME),
            other => panic!("unexpected result: {other:?}"),
        }
        plane.seed_secret(NAME, "value");
        secrets.require(&mut plane, SecretRole::PsqlEditor).unwrap();
    }

    #[test]
    fn unreadable_file_is_reported_with_role() {
        let dir = tempdir().unwrap();
        let mut secrets = manager();
        let err = secrets
            .from_file(SecretRole::PsqlEditor, &dir.path().join("missing"))
            .unwrap_err();
        match err {
            Error::ReadSecretFile { role, .. } => assert_eq!(role, "PostgreSQL editor password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn supplying_an_unbound_role_is_a_usage_error() {
        let mut secrets = manager();
        let err = secrets
            .from_reader(SecretRole::SmtpPassword, SecretSource::Stdin, "pw".as_bytes())
            .unwrap_err();
        assert!(err.is_usage(), "{err:?}");
    }

    #[test]
    fn supplied_values_are_redacted_in_debug_output() {
        let mut secrets = manager();
        secrets
            .from_reader(SecretRole::PsqlEditor, SecretSource::Stdin, "hunter2".as_bytes())
            .unwrap();
        assert!(!format!("{secrets:?}").contains("hunter2"));
        assert_eq!(
            secrets.binding(SecretRole::PsqlEditor).and_then(SecretBinding::source),
            Some(&SecretSource::Stdin)
        );
    }

    #[test]
    fn derived_value_is_written_only_when_it_changes() {
        let mut secrets = manager();
        secrets.ensure(SecretRole::PsqlPgpass, "kernelci-production", "kcidb_psql_pgpass");
        let mut plane = plane();
        let line = "*:*:*:kcidb_editor:pw\n";
        assert!(secrets.store_derived(&mut plane, SecretRole::PsqlPgpass, line, &mut ()).unwrap());
        assert!(!secrets.store_derived(&mut plane, SecretRole::PsqlPgpass, line, &mut ()).unwrap());
        assert!(
            secrets
                .store_derived(&mut plane, SecretRole::PsqlPgpass, "*:*:*:kcidb_editor:new\n", &mut ())
                .unwrap()
        );
        assert_eq!(plane.secret_versions("kcidb_psql_pgpass").len(), 2);
    }
}
