//! Control plane backed by in-process maps.
//!
//! Every call is appended to a log so callers can assert on ordering, and a single
//! call can be primed to fail.

use std::collections::BTreeMap;

use super::{ControlPlane, Resource, ResourceKey, ResourceKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(ResourceKey),
    Create(ResourceKey),
    Update(ResourceKey),
    Delete(ResourceKey),
    SecretHasValue(String),
    AddSecretVersion(String),
    SecretValue(String),
    /// `instance/user`
    ResetPassword(String),
}

#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    resources: BTreeMap<ResourceKey, Resource>,
    secret_versions: BTreeMap<String, Vec<String>>,
    passwords: BTreeMap<String, String>,
    calls: Vec<Call>,
    fail_on: Option<Call>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the first call equal to `call` fail with a provider error.
    pub fn fail_on(&mut self, call: Call) {
        self.fail_on = Some(call);
    }

    /// Insert a resource without recording a call.
    pub fn seed(&mut self, resource: Resource) {
        self.resources.insert(resource.key(), resource);
    }

    /// Store a secret value without recording a call.
    pub fn seed_secret(&mut self, name: &str, value: &str) {
        self.secret_versions
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Password last set through `reset_password`, keyed by `instance/user`.
    pub fn password(&self, instance: &str, user: &str) -> Option<&str> {
        self.passwords
            .get(&format!("{instance}/{user}"))
            .map(String::as_str)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources.keys().cloned().collect()
    }

    pub fn secret_versions(&self, name: &str) -> &[String] {
        self.secret_versions
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keys passed to `create`, in call order.
    pub fn created(&self) -> Vec<ResourceKey> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Create(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keys passed to `delete`, in call order.
    pub fn deleted(&self) -> Vec<ResourceKey> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Delete(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: Call) -> Result<()> {
        let failing = self.fail_on.as_ref() == Some(&call);
        let command = format!("{call:?}");
        self.calls.push(call);
        if failing {
            self.fail_on = None;
            return Err(Error::ProviderFailed {
                command,
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ControlPlane for InMemoryControlPlane {
    fn exists(&mut self, resource: &Resource) -> Result<bool> {
        let key = resource.key();
        self.record(Call::Exists(key.clone()))?;
        Ok(self.resources.contains_key(&key))
    }

    fn create(&mut self, resource: &Resource) -> Result<()> {
        let key = resource.key();
        self.record(Call::Create(key.clone()))?;
        if self.resources.contains_key(&key) {
            return Err(Error::ProviderFailed {
                command: format!("create {key}"),
                status: "exit status: 1".to_string(),
                stderr: "ALREADY_EXISTS".to_string(),
            });
        }
        self.resources.insert(key, resource.clone());
        Ok(())
    }

    fn update(&mut self, resource: &Resource) -> Result<()> {
        let key = resource.key();
        self.record(Call::Update(key.clone()))?;
        match self.resources.get_mut(&key) {
            Some(existing) => {
                *existing = resource.clone();
                Ok(())
            }
            None => Err(Error::ProviderFailed {
                command: format!("update {key}"),
                status: "exit status: 1".to_string(),
                stderr: "NOT_FOUND".to_string(),
            }),
        }
    }

    fn delete(&mut self, resource: &Resource) -> Result<()> {
        let key = resource.key();
        self.record(Call::Delete(key.clone()))?;
        if self.resources.remove(&key).is_none() {
            return Err(Error::ProviderFailed {
                command: format!("delete {key}"),
                status: "exit status: 1".to_string(),
                stderr: "NOT_FOUND".to_string(),
            });
        }
        if let Resource::Secret { name } = resource {
            self.secret_versions.remove(name);
        }
        Ok(())
    }

    fn secret_has_value(&mut self, name: &str) -> Result<bool> {
        self.record(Call::SecretHasValue(name.to_string()))?;
        Ok(!self.secret_versions(name).is_empty())
    }

    fn add_secret_version(&mut self, name: &str, value: &str) -> Result<()> {
        self.record(Call::AddSecretVersion(name.to_string()))?;
        self.secret_versions
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    fn secret_value(&mut self, name: &str) -> Result<String> {
        self.record(Call::SecretValue(name.to_string()))?;
        self.secret_versions(name)
            .last()
            .cloned()
            .ok_or_else(|| Error::ProviderFailed {
                command: format!("access {name}"),
                status: "exit status: 1".to_string(),
                stderr: "NOT_FOUND".to_string(),
            })
    }

    fn reset_password(&mut self, instance: &str, user: &str, password_secret: &str) -> Result<()> {
        let target = format!("{instance}/{user}");
        self.record(Call::ResetPassword(target.clone()))?;
        let key = ResourceKey {
            kind: ResourceKind::PsqlInstance,
            name: instance.to_string(),
        };
        if !self.resources.contains_key(&key) {
            return Err(Error::ProviderFailed {
                command: format!("set-password {target}"),
                status: "exit status: 1".to_string(),
                stderr: "The Cloud SQL instance does not exist.".to_string(),
            });
        }
        let password = self.secret_value(password_secret)?;
        self.passwords.insert(target, password);
        Ok(())
    }
}
