use std::fmt;

use super::plan::Action;
use super::provider::ResourceKey;
use super::secrets::SecretRole;

/// Structured event emitted while an operation talks to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Project-level prerequisites of a deploy were checked.
    PreflightCompleted {
        /// Whether the primary Cloud SQL instance already existed.
        psql_instance_exists: bool,
    },
    /// A plan step is about to run.
    StepStarted { action: Action, section: &'static str },
    /// A plan step was excluded by the section filter.
    StepSkipped { action: Action, section: &'static str },
    /// A plan step finished without error.
    StepCompleted {
        action: Action,
        section: &'static str,
        changes: ChangeSummary,
    },
    ResourceCreated { resource: ResourceKey },
    ResourceUpdated { resource: ResourceKey },
    /// Present already and not updatable in place.
    ResourceUnchanged { resource: ResourceKey },
    ResourceDeleted { resource: ResourceKey },
    /// Nothing to delete.
    ResourceAbsent { resource: ResourceKey },
    /// A random value was generated and stored as the first version of a secret.
    SecretGenerated { role: SecretRole, name: String },
    /// A supplied or derived value was stored as a new secret version.
    SecretStored { role: SecretRole, name: String },
    /// The secret already had a value and generation was skipped.
    SecretRetained { role: SecretRole, name: String },
    /// A database user's password was set from its secret.
    PasswordReset { instance: String, user: String },
    /// The database proxy for a shell session is accepting connections.
    ProxyReady { program: String, port: u16 },
}

/// Per-step tally of provider changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub absent: usize,
}

impl ChangeSummary {
    pub fn record(&mut self, change: Change) {
        match change {
            Change::Created => self.created += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
            Change::Deleted => self.deleted += 1,
            Change::Absent => self.absent += 1,
        }
    }

    pub fn merge(&mut self, other: ChangeSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.absent += other.absent;
    }

    pub fn is_empty(&self) -> bool {
        *self == ChangeSummary::default()
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.created, "created"),
            (self.updated, "updated"),
            (self.unchanged, "unchanged"),
            (self.deleted, "deleted"),
            (self.absent, "absent"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{count} {label}"))
        .collect();
        if parts.is_empty() {
            f.write_str("no changes")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// What a single ensure/remove call did to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Absent,
}
