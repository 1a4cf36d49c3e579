//! Derivation of every provider-side identifier from `(project, namespace, test)`.
//!
//! Names come in two spellings: the underscore form `namespace + "_" + suffix` used
//! by Pub/Sub, Cloud Functions, BigQuery, Secret Manager and PostgreSQL objects, and a
//! dashed form for kinds that only accept `[a-z0-9-]` (Cloud SQL instances, Cloud Run
//! services, Artifact Registry repositories, buckets and service accounts).

use crate::error::{Error, Result};

/// Longest identifier accepted by the strictest kind we name.
pub const MAX_NAME_LEN: usize = 63;
const SERVICE_ACCOUNT_ID_LEN: std::ops::RangeInclusive<usize> = 6..=30;
const BUCKET_NAME_LEN: std::ops::RangeInclusive<usize> = 3..=63;

pub const PSQL_SUPERUSER: &str = "postgres";

/// Concrete identifiers for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    pub project: String,
    pub namespace: String,
    pub prefix: String,
    pub dashed_prefix: String,
    pub runtime_service_account_id: String,
    pub topics: Topics,
    pub load_queue_subscription: String,
    pub smtp_queue: SmtpQueue,
    pub functions: Functions,
    pub jobs: SchedulerJobs,
    pub psql: PsqlNames,
    pub bigquery_dataset: String,
    pub secrets: SecretNames,
    pub cache_bucket: String,
    pub artifact_repository: String,
    pub dashboard_service: String,
    pub test: Option<TestOverlay>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub new: String,
    pub load_queue_trigger: String,
    pub pick_notifications_trigger: String,
    pub updated: String,
    pub updated_urls: String,
    pub archive_trigger: String,
    pub cost_mon_trigger: String,
}

/// Pub/Sub substitute for the mail relay, used when SMTP is mocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpQueue {
    pub topic: String,
    pub subscription: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Functions {
    pub load_queue: String,
    pub spool_notifications: String,
    pub pick_notifications: String,
    pub cache_urls: String,
    pub cache_redirect: String,
    pub archive: String,
    pub cost_mon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerJobs {
    pub load_queue: String,
    pub pick_notifications: String,
    pub archive: String,
    pub cost_mon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsqlNames {
    pub instance: String,
    pub database: String,
    pub editor: String,
    pub viewer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretNames {
    pub psql_superuser: String,
    pub psql_editor: String,
    pub psql_viewer: String,
    /// Ready-to-use `.pgpass` contents for the editor user.
    pub psql_pgpass: String,
    pub smtp_password: String,
}

/// Extra database names for isolated test installations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOverlay {
    pub clean: DatabaseOverlay,
    pub empty: DatabaseOverlay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOverlay {
    pub psql_database: String,
    pub bigquery_dataset: String,
}

impl TestOverlay {
    pub fn names(&self) -> Vec<&str> {
        [&self.clean, &self.empty]
            .into_iter()
            .flat_map(|overlay| [overlay.psql_database.as_str(), overlay.bigquery_dataset.as_str()])
            .collect()
    }

    pub fn overlays(&self) -> [&DatabaseOverlay; 2] {
        [&self.clean, &self.empty]
    }
}

impl ResourceSet {
    pub fn runtime_service_account(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.runtime_service_account_id, self.project
        )
    }

    /// Cloud SQL connection name (`project:region:instance`).
    pub fn psql_connection_name(&self, region: &str) -> String {
        format!("{}:{}:{}", self.project, region, self.psql.instance)
    }

    /// Every production identifier, test overlays excluded.
    pub fn production_names(&self) -> Vec<&str> {
        let topics = &self.topics;
        let functions = &self.functions;
        let jobs = &self.jobs;
        let secrets = &self.secrets;
        [
            &self.runtime_service_account_id,
            &topics.new,
            &topics.load_queue_trigger,
            &topics.pick_notifications_trigger,
            &topics.updated,
            &topics.updated_urls,
            &topics.archive_trigger,
            &topics.cost_mon_trigger,
            &self.load_queue_subscription,
            &self.smtp_queue.topic,
            &self.smtp_queue.subscription,
            &functions.load_queue,
            &functions.spool_notifications,
            &functions.pick_notifications,
            &functions.cache_urls,
            &functions.cache_redirect,
            &functions.archive,
            &functions.cost_mon,
            &jobs.load_queue,
            &jobs.pick_notifications,
            &jobs.archive,
            &jobs.cost_mon,
            &self.psql.instance,
            &self.psql.database,
            &self.psql.editor,
            &self.psql.viewer,
            &self.bigquery_dataset,
            &secrets.psql_superuser,
            &secrets.psql_editor,
            &secrets.psql_viewer,
            &secrets.psql_pgpass,
            &secrets.smtp_password,
            &self.cache_bucket,
            &self.artifact_repository,
            &self.dashboard_service,
        ]
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}

/// Compute the resource set for an installation.
pub fn derive(project: &str, namespace: &str, test: bool) -> Result<ResourceSet> {
    validate_project(project)?;
    validate_namespace(namespace)?;

    let prefix = format!("{namespace}_");
    let dashed_prefix = dash(&prefix);
    let name = |suffix: &str| format!("{prefix}{suffix}");
    let dashed = |suffix: &str| format!("{dashed_prefix}{suffix}");

    let psql_database = name("op");
    let bigquery_dataset = name("archive");
    let overlay = |variant: &str| DatabaseOverlay {
        psql_database: format!("{psql_database}_{variant}_test"),
        bigquery_dataset: format!("{bigquery_dataset}_{variant}_test"),
    };

    let set = ResourceSet {
        project: project.to_string(),
        namespace: namespace.to_string(),
        runtime_service_account_id: dashed("runtime"),
        topics: Topics {
            new: name("new"),
            load_queue_trigger: name("load_queue_trigger"),
            pick_notifications_trigger: name("pick_notifications_trigger"),
            updated: name("updated"),
            updated_urls: name("updated_urls"),
            archive_trigger: name("archive_trigger"),
            cost_mon_trigger: name("cost_mon_trigger"),
        },
        load_queue_subscription: name("new_load"),
        smtp_queue: SmtpQueue {
            topic: name("smtp"),
            subscription: name("smtp_receiver"),
        },
        functions: Functions {
            load_queue: name("load_queue"),
            spool_notifications: name("spool_notifications"),
            pick_notifications: name("pick_notifications"),
            cache_urls: name("cache_urls"),
            cache_redirect: name("cache_redirect"),
            archive: name("archive"),
            cost_mon: name("cost_mon"),
        },
        jobs: SchedulerJobs {
            load_queue: name("load_queue_trigger"),
            pick_notifications: name("pick_notifications_trigger"),
            archive: name("archive_trigger"),
            cost_mon: name("cost_mon_trigger"),
        },
        psql: PsqlNames {
            instance: dashed("psql"),
            database: psql_database.clone(),
            editor: name("editor"),
            viewer: name("viewer"),
        },
        bigquery_dataset: bigquery_dataset.clone(),
        secrets: SecretNames {
            psql_superuser: name("psql_superuser_password"),
            psql_editor: name("psql_editor_password"),
            psql_viewer: name("psql_viewer_password"),
            psql_pgpass: name("psql_pgpass"),
            smtp_password: name("smtp_password"),
        },
        cache_bucket: format!("{project}-{}", dashed("cache")),
        artifact_repository: dashed("images"),
        dashboard_service: dashed("dashboard"),
        test: test.then(|| TestOverlay {
            clean: overlay("clean"),
            empty: overlay("empty"),
        }),
        prefix,
        dashed_prefix,
    };

    check_constraints(&set)?;
    Ok(set)
}

/// Fold every character outside `[a-z0-9-]` to `-`.
pub fn dash(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn validate_project(project: &str) -> Result<()> {
    let bytes = project.as_bytes();
    let valid = (6..=30).contains(&bytes.len())
        && bytes[0].is_ascii_lowercase()
        && bytes[bytes.len() - 1] != b'-'
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidProjectId {
            project: project.to_string(),
        })
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    };
    let Some(first) = namespace.chars().next() else {
        return Err(invalid("must not be empty"));
    };
    if !first.is_ascii_lowercase() {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits and underscores",
        ));
    }
    Ok(())
}

fn check_constraints(set: &ResourceSet) -> Result<()> {
    let too_long = |name: &str, limit: String| Error::InvalidNamespace {
        namespace: set.namespace.clone(),
        reason: format!("derived identifier `{name}` is longer than {limit} characters"),
    };

    for name in set.production_names() {
        if name.len() > MAX_NAME_LEN {
            return Err(too_long(name, MAX_NAME_LEN.to_string()));
        }
    }
    if let Some(test) = &set.test {
        for name in test.names() {
            if name.len() > MAX_NAME_LEN {
                return Err(too_long(name, MAX_NAME_LEN.to_string()));
            }
        }
    }

    let account = &set.runtime_service_account_id;
    if !SERVICE_ACCOUNT_ID_LEN.contains(&account.len()) {
        return Err(Error::InvalidNamespace {
            namespace: set.namespace.clone(),
            reason: format!(
                "derived service account ID `{account}` must be {}-{} characters long",
                SERVICE_ACCOUNT_ID_LEN.start(),
                SERVICE_ACCOUNT_ID_LEN.end()
            ),
        });
    }
    if !BUCKET_NAME_LEN.contains(&set.cache_bucket.len()) {
        return Err(too_long(&set.cache_bucket, BUCKET_NAME_LEN.end().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        for test in [false, true] {
            let first = derive("kernelci-production", "gh1234_kcidb", test).unwrap();
            let second = derive("kernelci-production", "gh1234_kcidb", test).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn names_use_prefix_and_dashed_prefix() {
        let set = derive("kernelci-production", "gh1234_kcidb", false).unwrap();
        assert_eq!(set.prefix, "gh1234_kcidb_");
        assert_eq!(set.dashed_prefix, "gh1234-kcidb-");
        assert_eq!(set.topics.new, "gh1234_kcidb_new");
        assert_eq!(set.load_queue_subscription, "gh1234_kcidb_new_load");
        assert_eq!(set.psql.instance, "gh1234-kcidb-psql");
        assert_eq!(set.cache_bucket, "kernelci-production-gh1234-kcidb-cache");
        assert_eq!(
            set.runtime_service_account(),
            "gh1234-kcidb-runtime@kernelci-production.iam.gserviceaccount.com"
        );
        assert!(set.test.is_none());
    }

    #[test]
    fn dashed_names_only_use_restricted_charset() {
        let set = derive("kernelci-production", "kcidb", false).unwrap();
        for name in [
            &set.psql.instance,
            &set.artifact_repository,
            &set.dashboard_service,
            &set.cache_bucket,
            &set.runtime_service_account_id,
        ] {
            assert!(
                name.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "{name}"
            );
        }
    }

    #[test]
    fn test_overlay_never_collides_with_production() {
        let production = derive("kernelci-production", "kcidb", false).unwrap();
        let with_test = derive("kernelci-production", "kcidb", true).unwrap();
        let overlay = with_test.test.as_ref().expect("test overlay");

        assert_eq!(overlay.clean.psql_database, "kcidb_op_clean_test");
        assert_eq!(overlay.empty.bigquery_dataset, "kcidb_archive_empty_test");

        let production_names = production.production_names();
        for name in overlay.names() {
            assert!(!production_names.contains(&name), "{name} collides");
        }
        assert_eq!(production_names, with_test.production_names());
    }

    #[test]
    fn invalid_namespaces_are_rejected() {
        for namespace in ["", "1kcidb", "KCIDB", "kci-db", "kc idb"] {
            match derive("kernelci-production", namespace, false) {
                Err(Error::InvalidNamespace { .. }) => {}
                other => panic!("{namespace:?}: expected InvalidNamespace, got {other:?}"),
            }
        }
    }

    #[test]
    fn overlong_namespace_is_rejected() {
        let namespace = "k".repeat(40);
        let err = derive("kernelci-production", &namespace, false).unwrap_err();
        match err {
            Error::InvalidNamespace { reason, .. } => assert!(reason.contains("characters")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_project_ids_are_rejected() {
        for project in ["abc", "Kernelci", "kernelci-", "9kernelci"] {
            assert!(
                matches!(
                    derive(project, "kcidb", false),
                    Err(Error::InvalidProjectId { .. })
                ),
                "{project}"
            );
        }
    }

    #[test]
    fn dash_folds_disallowed_characters() {
        assert_eq!(dash("gh1234_kcidb_"), "gh1234-kcidb-");
        assert_eq!(dash("a.b-c"), "a-b-c");
    }
}
