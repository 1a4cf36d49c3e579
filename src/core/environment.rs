//! The configuration document shared by every deployed function.
//!
//! An [`Environment`] is compiled once per invocation from the resource set, the
//! command-line flags and the settings file, and is never mutated afterwards. The
//! same value feeds `env` output, the `shell` child process and function deploys.

use std::fmt;
use std::str::FromStr;

use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::core::namespace::ResourceSet;
use crate::core::thresholds::CostThresholds;
use crate::error::{Error, Result};

pub const DEFAULT_LOG_LEVEL: &str = "INFO";
const DIGEST_LEN: usize = 12;

/// Output encodings accepted by `env --format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvFormat {
    #[default]
    Yaml,
    Shell,
}

impl FromStr for EnvFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "yaml" => Ok(EnvFormat::Yaml),
            "sh" => Ok(EnvFormat::Shell),
            other => Err(Error::UnknownFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EnvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvFormat::Yaml => "yaml",
            EnvFormat::Shell => "sh",
        })
    }
}

/// How functions reach the relational database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseHost {
    /// Unix socket mounted by Cloud Functions and Cloud Run.
    CloudSqlSocket,
    /// Local TCP port forwarded by `cloud-sql-proxy`.
    Proxy { port: u16 },
}

/// Inputs to [`Environment::compile`] that come from flags rather than settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentFlags {
    pub log_level: String,
    pub heavy_asserts: bool,
    pub updated_publish: bool,
    pub smtp_mocked: bool,
    pub smtp_to_addrs: Option<String>,
    pub extra_cc: Option<String>,
    pub cost_thresholds: Option<CostThresholds>,
    pub database_host: DatabaseHost,
}

impl Default for EnvironmentFlags {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            heavy_asserts: false,
            updated_publish: true,
            smtp_mocked: false,
            smtp_to_addrs: None,
            extra_cc: None,
            cost_thresholds: None,
            database_host: DatabaseHost::CloudSqlSocket,
        }
    }
}

/// Scheme-prefixed database specification understood by the kcidb library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSpec {
    Postgresql {
        host: String,
        port: Option<u16>,
        dbname: String,
        user: String,
    },
    BigQuery {
        project: String,
        dataset: String,
    },
    Mux(Vec<DatabaseSpec>),
}

impl fmt::Display for DatabaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSpec::Postgresql {
                host,
                port,
                dbname,
                user,
            } => {
                write!(f, "postgresql:host={host}")?;
                if let Some(port) = port {
                    write!(f, " port={port}")?;
                }
                write!(f, " dbname={dbname} user={user}")
            }
            DatabaseSpec::BigQuery { project, dataset } => {
                write!(f, "bigquery:{project}.{dataset}")
            }
            DatabaseSpec::Mux(members) => {
                let members: Vec<String> = members
                    .iter()
                    .map(|member| {
                        member
                            .to_string()
                            .replace('\\', "\\\\")
                            .replace(' ', "\\ ")
                    })
                    .collect();
                write!(f, "mux:{}", members.join(" "))
            }
        }
    }
}

/// Immutable, ordered key/value configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    entries: Vec<(&'static str, String)>,
}

impl Environment {
    pub fn compile(resources: &ResourceSet, flags: &EnvironmentFlags, settings: &Settings) -> Self {
        let mut entries: Vec<(&'static str, String)> = Vec::new();
        let mut set = |key: &'static str, value: String| entries.push((key, value));
        let flag = |value: bool| (if value { "1" } else { "0" }).to_string();

        let database = |dbname: &str, dataset: &str| {
            let operational = postgresql(resources, settings, flags, dbname);
            let archive = DatabaseSpec::BigQuery {
                project: resources.project.clone(),
                dataset: dataset.to_string(),
            };
            (operational.clone(), archive.clone(), DatabaseSpec::Mux(vec![operational, archive]))
        };
        let (operational, archive, mux) =
            database(&resources.psql.database, &resources.bigquery_dataset);

        set("KCIDB_LOG_LEVEL", flags.log_level.clone());
        set("KCIDB_HEAVY_ASSERTS", flag(flags.heavy_asserts));
        set("KCIDB_UPDATED_PUBLISH", flag(flags.updated_publish));
        set("KCIDB_PROJECT_ID", resources.project.clone());
        set("KCIDB_LOAD_QUEUE_TOPIC", resources.topics.new.clone());
        set(
            "KCIDB_LOAD_QUEUE_SUBSCRIPTION",
            resources.load_queue_subscription.clone(),
        );
        set("KCIDB_LOAD_QUEUE_MSG_MAX", settings.load_queue.msg_max.to_string());
        set("KCIDB_LOAD_QUEUE_OBJ_MAX", settings.load_queue.obj_max.to_string());
        set(
            "KCIDB_LOAD_QUEUE_TIMEOUT_SEC",
            settings.load_queue.timeout_sec.to_string(),
        );
        set("KCIDB_OPERATIONAL_DATABASE", operational.to_string());
        set("KCIDB_ARCHIVE_DATABASE", archive.to_string());
        set("KCIDB_DATABASE", mux.to_string());
        set("KCIDB_PSQL_PGPASS_SECRET", resources.secrets.psql_pgpass.clone());
        set("KCIDB_UPDATED_QUEUE_TOPIC", resources.topics.updated.clone());
        set("KCIDB_UPDATED_URLS_TOPIC", resources.topics.updated_urls.clone());
        set("KCIDB_CACHE_BUCKET_NAME", resources.cache_bucket.clone());
        set(
            "KCIDB_CACHE_REDIRECTOR_URL",
            cache_redirector_url(resources, &settings.region),
        );
        set("KCIDB_SMTP_HOST", settings.smtp.host.clone());
        set("KCIDB_SMTP_PORT", settings.smtp.port.to_string());
        set("KCIDB_SMTP_USER", settings.smtp.user.clone());
        set("KCIDB_SMTP_FROM_ADDR", settings.smtp.from_addr.clone());

        if flags.smtp_mocked {
            set("KCIDB_SMTP_TOPIC", resources.smtp_queue.topic.clone());
            set(
                "KCIDB_SMTP_SUBSCRIPTION",
                resources.smtp_queue.subscription.clone(),
            );
        } else {
            set(
                "KCIDB_SMTP_PASSWORD_SECRET",
                resources.secrets.smtp_password.clone(),
            );
        }
        if let Some(addrs) = non_empty(&flags.smtp_to_addrs) {
            set("KCIDB_SMTP_TO_ADDRS", addrs.to_string());
        }
        if let Some(cc) = non_empty(&flags.extra_cc) {
            set("KCIDB_EXTRA_CC", cc.to_string());
        }
        if let Some(test) = &resources.test {
            let (_, _, clean) =
                database(&test.clean.psql_database, &test.clean.bigquery_dataset);
            let (_, _, empty) =
                database(&test.empty.psql_database, &test.empty.bigquery_dataset);
            set("KCIDB_CLEAN_TEST_DATABASE", clean.to_string());
            set("KCIDB_EMPTY_TEST_DATABASE", empty.to_string());
        }
        if let Some(thresholds) = &flags.cost_thresholds {
            set("KCIDB_COST_THRESHOLDS", thresholds.to_json());
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self, format: EnvFormat) -> Result<String> {
        match format {
            EnvFormat::Yaml => {
                let mut mapping = Mapping::new();
                for (key, value) in &self.entries {
                    mapping.insert(
                        Value::String((*key).to_string()),
                        Value::String(value.clone()),
                    );
                }
                serde_yaml::to_string(&mapping).map_err(|source| Error::RenderEnvironment { source })
            }
            EnvFormat::Shell => Ok(self
                .entries
                .iter()
                .map(|(key, value)| format!("export {key}={}\n", shell_quote(value)))
                .collect()),
        }
    }

    /// Short content hash, stable across invocations with identical inputs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.entries {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(DIGEST_LEN);
        digest
    }
}

/// URL of the HTTP-triggered cache redirector function.
pub fn cache_redirector_url(resources: &ResourceSet, region: &str) -> String {
    format!(
        "https://{region}-{}.cloudfunctions.net/{}",
        resources.project, resources.functions.cache_redirect
    )
}

fn postgresql(
    resources: &ResourceSet,
    settings: &Settings,
    flags: &EnvironmentFlags,
    dbname: &str,
) -> DatabaseSpec {
    let (host, port) = match flags.database_host {
        DatabaseHost::CloudSqlSocket => (
            format!("/cloudsql/{}", resources.psql_connection_name(&settings.region)),
            None,
        ),
        DatabaseHost::Proxy { port } => ("127.0.0.1".to_string(), Some(port)),
    };
    DatabaseSpec::Postgresql {
        host,
        port,
        dbname: dbname.to_string(),
        user: resources.psql.editor.clone(),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// Single-quote `input` for POSIX shells.
pub fn shell_quote(input: &str) -> String {
    let mut result = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            result.push_str("'\\''");
        } else {
            result.push(ch);
        }
    }
    result.push('\'');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::namespace::derive;

    fn compile(test: bool, flags: &EnvironmentFlags) -> Environment {
        let resources = derive("kernelci-production", "kcidb", test).unwrap();
        Environment::compile(&resources, flags, &Settings::default())
    }

    #[test]
    fn optional_keys_are_omitted_by_default() {
        let env = compile(false, &EnvironmentFlags::default());
        for key in [
            "KCIDB_EXTRA_CC",
            "KCIDB_SMTP_TO_ADDRS",
            "KCIDB_SMTP_TOPIC",
            "KCIDB_SMTP_SUBSCRIPTION",
            "KCIDB_CLEAN_TEST_DATABASE",
            "KCIDB_COST_THRESHOLDS",
        ] {
            assert!(!env.contains(key), "{key} should be absent");
        }
        assert_eq!(
            env.get("KCIDB_SMTP_PASSWORD_SECRET"),
            Some("kcidb_smtp_password")
        );
        assert_eq!(env.get("KCIDB_HEAVY_ASSERTS"), Some("0"));
        assert_eq!(env.get("KCIDB_UPDATED_PUBLISH"), Some("1"));
    }

    #[test]
    fn mocked_smtp_swaps_secret_for_queue() {
        let flags = EnvironmentFlags {
            smtp_mocked: true,
            ..EnvironmentFlags::default()
        };
        let env = compile(false, &flags);
        assert_eq!(env.get("KCIDB_SMTP_TOPIC"), Some("kcidb_smtp"));
        assert_eq!(env.get("KCIDB_SMTP_SUBSCRIPTION"), Some("kcidb_smtp_receiver"));
        assert!(!env.contains("KCIDB_SMTP_PASSWORD_SECRET"));
    }

    #[test]
    fn blank_optional_values_are_treated_as_absent() {
        let flags = EnvironmentFlags {
            extra_cc: Some("  ".to_string()),
            smtp_to_addrs: Some("kernelci-results@groups.io".to_string()),
            ..EnvironmentFlags::default()
        };
        let env = compile(false, &flags);
        assert!(!env.contains("KCIDB_EXTRA_CC"));
        assert_eq!(
            env.get("KCIDB_SMTP_TO_ADDRS"),
            Some("kernelci-results@groups.io")
        );
    }

    #[test]
    fn database_specs_are_scheme_prefixed() {
        let env = compile(true, &EnvironmentFlags::default());
        assert_eq!(
            env.get("KCIDB_OPERATIONAL_DATABASE"),
            Some(
                "postgresql:host=/cloudsql/kernelci-production:us-central1:kcidb-psql \
                 dbname=kcidb_op user=kcidb_editor"
            )
        );
        assert_eq!(
            env.get("KCIDB_ARCHIVE_DATABASE"),
            Some("bigquery:kernelci-production.kcidb_archive")
        );
        assert_eq!(
            env.get("KCIDB_DATABASE"),
            Some(
                "mux:postgresql:host=/cloudsql/kernelci-production:us-central1:kcidb-psql\\ \
                 dbname=kcidb_op\\ user=kcidb_editor bigquery:kernelci-production.kcidb_archive"
            )
        );
        let clean = env.get("KCIDB_CLEAN_TEST_DATABASE").expect("test database");
        assert!(clean.contains("dbname=kcidb_op_clean_test"));
        assert!(clean.ends_with("bigquery:kernelci-production.kcidb_archive_clean_test"));
    }

    #[test]
    fn proxy_host_uses_local_port() {
        let flags = EnvironmentFlags {
            database_host: DatabaseHost::Proxy { port: 5433 },
            ..EnvironmentFlags::default()
        };
        let env = compile(false, &flags);
        assert_eq!(
            env.get("KCIDB_OPERATIONAL_DATABASE"),
            Some("postgresql:host=127.0.0.1 port=5433 dbname=kcidb_op user=kcidb_editor")
        );
    }

    #[test]
    fn redirector_url_is_derived_from_region_and_project() {
        let env = compile(false, &EnvironmentFlags::default());
        assert_eq!(
            env.get("KCIDB_CACHE_REDIRECTOR_URL"),
            Some("https://us-central1-kernelci-production.cloudfunctions.net/kcidb_cache_redirect")
        );
    }

    #[test]
    fn yaml_rendering_quotes_every_value_as_string() {
        let env = compile(false, &EnvironmentFlags::default());
        let yaml = env.render(EnvFormat::Yaml).unwrap();
        let parsed: std::collections::BTreeMap<String, String> =
            serde_yaml::from_str(&yaml).expect("rendered YAML parses as a string map");
        assert_eq!(parsed.len(), env.len());
        assert_eq!(parsed["KCIDB_LOAD_QUEUE_MSG_MAX"], "256");
        assert_eq!(parsed["KCIDB_HEAVY_ASSERTS"], "0");
    }

    #[test]
    fn shell_rendering_exports_quoted_values() {
        let flags = EnvironmentFlags {
            extra_cc: Some("o'brien@example.org".to_string()),
            ..EnvironmentFlags::default()
        };
        let env = compile(false, &flags);
        let script = env.render(EnvFormat::Shell).unwrap();
        assert!(script.starts_with("export KCIDB_LOG_LEVEL='INFO'\n"));
        assert!(script.contains("export KCIDB_EXTRA_CC='o'\\''brien@example.org'\n"));
        assert_eq!(script.lines().count(), env.len());
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!("sh".parse::<EnvFormat>().unwrap(), EnvFormat::Shell);
        match "json".parse::<EnvFormat>() {
            Err(Error::UnknownFormat { format }) => assert_eq!(format, "json"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn digest_tracks_content() {
        let plain = compile(false, &EnvironmentFlags::default());
        let again = compile(false, &EnvironmentFlags::default());
        let mocked = compile(
            false,
            &EnvironmentFlags {
                smtp_mocked: true,
                ..EnvironmentFlags::default()
            },
        );
        assert_eq!(plain.digest(), again.digest());
        assert_ne!(plain.digest(), mocked.digest());
        assert_eq!(plain.digest().len(), DIGEST_LEN);
    }
}
