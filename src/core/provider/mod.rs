//! Boundary between provisioners and the cloud provider's control plane.
//!
//! Provisioners describe what should exist as [`Resource`] values; a [`ControlPlane`]
//! answers existence queries and applies creates, in-place updates and deletes. The
//! production backend shells out to `gcloud`/`bq` ([`gcloud::GcloudControlPlane`]);
//! [`memory::InMemoryControlPlane`] keeps resources in a map and records every call.

pub mod gcloud;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use crate::core::environment::Environment;
use crate::error::Result;

pub use gcloud::GcloudControlPlane;
pub use memory::{Call, InMemoryControlPlane};

/// Blocking, sequential access to the provider.
pub trait ControlPlane {
    fn exists(&mut self, resource: &Resource) -> Result<bool>;
    fn create(&mut self, resource: &Resource) -> Result<()>;
    /// Apply the resource's mutable attributes to an existing instance.
    fn update(&mut self, resource: &Resource) -> Result<()>;
    fn delete(&mut self, resource: &Resource) -> Result<()>;
    /// Whether the named secret holds at least one enabled version.
    fn secret_has_value(&mut self, name: &str) -> Result<bool>;
    /// Store a new version of the named secret.
    fn add_secret_version(&mut self, name: &str, value: &str) -> Result<()>;
    /// Latest version of the named secret.
    fn secret_value(&mut self, name: &str) -> Result<String>;
    /// Set the password of an existing database user to the latest version of
    /// `password_secret`.
    fn reset_password(&mut self, instance: &str, user: &str, password_secret: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Service,
    AppEngine,
    ServiceAccount,
    IamBinding,
    Secret,
    PsqlInstance,
    PsqlDatabase,
    PsqlUser,
    BigQueryDataset,
    ArtifactRepository,
    RunService,
    Topic,
    Subscription,
    Bucket,
    Function,
    SchedulerJob,
}

impl ResourceKind {
    /// Kinds with attributes that can be changed in place without recreating them.
    pub fn is_updatable(self) -> bool {
        matches!(
            self,
            ResourceKind::PsqlInstance
                | ResourceKind::BigQueryDataset
                | ResourceKind::ArtifactRepository
                | ResourceKind::RunService
                | ResourceKind::Subscription
                | ResourceKind::Function
                | ResourceKind::SchedulerJob
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            ResourceKind::Service => "service API",
            ResourceKind::AppEngine => "App Engine application",
            ResourceKind::ServiceAccount => "service account",
            ResourceKind::IamBinding => "IAM binding",
            ResourceKind::Secret => "secret",
            ResourceKind::PsqlInstance => "Cloud SQL instance",
            ResourceKind::PsqlDatabase => "PostgreSQL database",
            ResourceKind::PsqlUser => "PostgreSQL user",
            ResourceKind::BigQueryDataset => "BigQuery dataset",
            ResourceKind::ArtifactRepository => "artifact repository",
            ResourceKind::RunService => "Cloud Run service",
            ResourceKind::Topic => "Pub/Sub topic",
            ResourceKind::Subscription => "Pub/Sub subscription",
            ResourceKind::Bucket => "storage bucket",
            ResourceKind::Function => "Cloud Function",
            ResourceKind::SchedulerJob => "scheduler job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Identity of a resource: its kind plus a display name unique within the kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// What an IAM binding grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IamTarget {
    Project,
    Topic(String),
    Bucket(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionTrigger {
    Topic(String),
    /// Publicly invocable HTTP endpoint.
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub region: String,
    pub runtime: String,
    pub entry_point: String,
    pub source: PathBuf,
    pub memory: String,
    pub timeout_sec: u32,
    pub service_account: String,
    pub docker_repository: String,
    pub trigger: FunctionTrigger,
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunServiceSpec {
    pub name: String,
    pub region: String,
    pub image: String,
    pub service_account: String,
    pub cloudsql_instance: String,
    pub env: Vec<(String, String)>,
    /// Environment variables resolved from Secret Manager (`variable`, `secret`).
    pub secret_env: Vec<(String, String)>,
}

/// Desired state of one provider-side resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Service {
        name: String,
    },
    AppEngine {
        region: String,
    },
    ServiceAccount {
        id: String,
        email: String,
        display_name: String,
    },
    IamBinding {
        target: IamTarget,
        member: String,
        role: String,
    },
    Secret {
        name: String,
    },
    PsqlInstance {
        name: String,
        region: String,
        version: String,
        tier: String,
        root_password_secret: String,
    },
    PsqlDatabase {
        instance: String,
        name: String,
    },
    PsqlUser {
        instance: String,
        name: String,
        password_secret: String,
    },
    BigQueryDataset {
        name: String,
        location: String,
        description: String,
    },
    ArtifactRepository {
        name: String,
        location: String,
        description: String,
    },
    RunService(Box<RunServiceSpec>),
    Topic {
        name: String,
    },
    Subscription {
        name: String,
        topic: String,
        ack_deadline_sec: u32,
        retention: String,
    },
    Bucket {
        name: String,
        location: String,
    },
    Function(Box<FunctionSpec>),
    SchedulerJob {
        name: String,
        region: String,
        schedule: String,
        topic: String,
        message_body: String,
    },
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Service { .. } => ResourceKind::Service,
            Resource::AppEngine { .. } => ResourceKind::AppEngine,
            Resource::ServiceAccount { .. } => ResourceKind::ServiceAccount,
            Resource::IamBinding { .. } => ResourceKind::IamBinding,
            Resource::Secret { .. } => ResourceKind::Secret,
            Resource::PsqlInstance { .. } => ResourceKind::PsqlInstance,
            Resource::PsqlDatabase { .. } => ResourceKind::PsqlDatabase,
            Resource::PsqlUser { .. } => ResourceKind::PsqlUser,
            Resource::BigQueryDataset { .. } => ResourceKind::BigQueryDataset,
            Resource::ArtifactRepository { .. } => ResourceKind::ArtifactRepository,
            Resource::RunService(_) => ResourceKind::RunService,
            Resource::Topic { .. } => ResourceKind::Topic,
            Resource::Subscription { .. } => ResourceKind::Subscription,
            Resource::Bucket { .. } => ResourceKind::Bucket,
            Resource::Function(_) => ResourceKind::Function,
            Resource::SchedulerJob { .. } => ResourceKind::SchedulerJob,
        }
    }

    /// Human-readable identifier, unique within the resource kind.
    pub fn name(&self) -> String {
        match self {
            Resource::Service { name }
            | Resource::Secret { name }
            | Resource::Topic { name }
            | Resource::BigQueryDataset { name, .. }
            | Resource::ArtifactRepository { name, .. }
            | Resource::PsqlInstance { name, .. }
            | Resource::Subscription { name, .. }
            | Resource::Bucket { name, .. }
            | Resource::SchedulerJob { name, .. } => name.clone(),
            Resource::AppEngine { .. } => "default".to_string(),
            Resource::ServiceAccount { email, .. } => email.clone(),
            Resource::IamBinding {
                target,
                member,
                role,
            } => {
                let target = match target {
                    IamTarget::Project => "project".to_string(),
                    IamTarget::Topic(topic) => format!("topic {topic}"),
                    IamTarget::Bucket(bucket) => format!("bucket {bucket}"),
                };
                format!("{role} for {member} on {target}")
            }
            Resource::PsqlDatabase { instance, name } | Resource::PsqlUser { instance, name, .. } => {
                format!("{instance}/{name}")
            }
            Resource::RunService(spec) => spec.name.clone(),
            Resource::Function(spec) => spec.name.clone(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind(),
            name: self.name(),
        }
    }
}
