use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

pub const SETTINGS_FILE_NAME: &str = "kcidb-cloud.toml";

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_PSQL_TIER: &str = "db-f1-micro";
pub const DEFAULT_PSQL_VERSION: &str = "POSTGRES_14";
pub const DEFAULT_FUNCTION_RUNTIME: &str = "python311";
pub const DEFAULT_FUNCTION_MEMORY: &str = "2048MB";
pub const DEFAULT_FUNCTION_TIMEOUT_SEC: u32 = 540;
pub const DEFAULT_LOAD_QUEUE_MSG_MAX: u32 = 256;
pub const DEFAULT_LOAD_QUEUE_OBJ_MAX: u32 = 8192;
pub const DEFAULT_LOAD_QUEUE_TIMEOUT_SEC: u32 = 30;
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SMTP_USER: &str = "bot@kernelci.org";
pub const DEFAULT_SMTP_FROM_ADDR: &str = "bot@kernelci.org";
pub const DEFAULT_DASHBOARD_IMAGE: &str = "docker.io/grafana/grafana-oss:10.4.2";

/// Operator-tunable settings for an installation, loaded from `kcidb-cloud.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Where the settings came from; `None` when built-in defaults are in use.
    pub file_path: Option<PathBuf>,
    pub region: String,
    pub psql: PsqlSettings,
    pub functions: FunctionSettings,
    pub load_queue: LoadQueueSettings,
    pub smtp: SmtpSettings,
    pub dashboard: DashboardSettings,
    pub schedules: ScheduleSettings,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsqlSettings {
    pub tier: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    pub runtime: String,
    pub memory: String,
    pub timeout_sec: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadQueueSettings {
    pub msg_max: u32,
    pub obj_max: u32,
    pub timeout_sec: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub from_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    pub image: String,
}

/// Cron schedules for the Cloud Scheduler jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub load_queue: String,
    pub pick_notifications: String,
    pub archive: String,
    pub cost_mon: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file_path: None,
            region: DEFAULT_REGION.to_string(),
            psql: PsqlSettings {
                tier: DEFAULT_PSQL_TIER.to_string(),
                version: DEFAULT_PSQL_VERSION.to_string(),
            },
            functions: FunctionSettings {
                runtime: DEFAULT_FUNCTION_RUNTIME.to_string(),
                memory: DEFAULT_FUNCTION_MEMORY.to_string(),
                timeout_sec: DEFAULT_FUNCTION_TIMEOUT_SEC,
            },
            load_queue: LoadQueueSettings {
                msg_max: DEFAULT_LOAD_QUEUE_MSG_MAX,
                obj_max: DEFAULT_LOAD_QUEUE_OBJ_MAX,
                timeout_sec: DEFAULT_LOAD_QUEUE_TIMEOUT_SEC,
            },
            smtp: SmtpSettings {
                host: DEFAULT_SMTP_HOST.to_string(),
                port: DEFAULT_SMTP_PORT,
                user: DEFAULT_SMTP_USER.to_string(),
                from_addr: DEFAULT_SMTP_FROM_ADDR.to_string(),
            },
            dashboard: DashboardSettings {
                image: DEFAULT_DASHBOARD_IMAGE.to_string(),
            },
            schedules: ScheduleSettings {
                load_queue: "* * * * *".to_string(),
                pick_notifications: "*/10 * * * *".to_string(),
                archive: "0 */6 * * *".to_string(),
                cost_mon: "0 * * * *".to_string(),
            },
            warnings: Vec::new(),
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(path, &contents)
}

fn parse_settings(path: &Path, contents: &str) -> Result<Settings, Error> {
    let value: toml::Value = toml::from_str(contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut warnings = detect_unknown_fields(&value);

    let raw = RawSettings::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut settings = raw.into_validated(path)?;
    settings.file_path = Some(path.to_path_buf());
    settings.warnings.append(&mut warnings);
    Ok(settings)
}

/// Walk upward from `start` looking for a settings file.
pub fn discover_settings_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn invalid_config(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn detect_unknown_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let allowed_root = [
        "region",
        "psql",
        "functions",
        "load_queue",
        "smtp",
        "dashboard",
        "schedules",
    ];

    let toml::Value::Table(table) = value else {
        return warnings;
    };
    warn_table(table, &allowed_root, "root", &mut warnings);

    let nested: [(&str, &[&str]); 6] = [
        ("psql", &["tier", "version"]),
        ("functions", &["runtime", "memory", "timeout_sec"]),
        ("load_queue", &["msg_max", "obj_max", "timeout_sec"]),
        ("smtp", &["host", "port", "user", "from_addr"]),
        ("dashboard", &["image"]),
        (
            "schedules",
            &["load_queue", "pick_notifications", "archive", "cost_mon"],
        ),
    ];
    for (name, allowed) in nested {
        if let Some(toml::Value::Table(inner)) = table.get(name) {
            warn_table(inner, allowed, &format!("[{name}]"), &mut warnings);
        }
    }

    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawSettings {
    region: Option<String>,
    #[serde(default)]
    psql: RawPsql,
    #[serde(default)]
    functions: RawFunctions,
    #[serde(default)]
    load_queue: RawLoadQueue,
    #[serde(default)]
    smtp: RawSmtp,
    #[serde(default)]
    dashboard: RawDashboard,
    #[serde(default)]
    schedules: RawSchedules,
}

#[derive(Debug, Deserialize, Default)]
struct RawPsql {
    tier: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFunctions {
    runtime: Option<String>,
    memory: Option<String>,
    timeout_sec: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLoadQueue {
    msg_max: Option<u32>,
    obj_max: Option<u32>,
    timeout_sec: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSmtp {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    from_addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDashboard {
    image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSchedules {
    load_queue: Option<String>,
    pick_notifications: Option<String>,
    archive: Option<String>,
    cost_mon: Option<String>,
}

impl RawSettings {
    fn into_validated(self, path: &Path) -> Result<Settings, Error> {
        let defaults = Settings::default();
        let RawSettings {
            region,
            psql,
            functions,
            load_queue,
            smtp,
            dashboard,
            schedules,
        } = self;

        let region = region.unwrap_or(defaults.region);
        if region.is_empty()
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid_config(
                path,
                format!("region `{region}` must be a lowercase region name such as `{DEFAULT_REGION}`"),
            ));
        }

        let load_queue = LoadQueueSettings {
            msg_max: load_queue.msg_max.unwrap_or(defaults.load_queue.msg_max),
            obj_max: load_queue.obj_max.unwrap_or(defaults.load_queue.obj_max),
            timeout_sec: load_queue
                .timeout_sec
                .unwrap_or(defaults.load_queue.timeout_sec),
        };
        for (field, value) in [
            ("load_queue.msg_max", load_queue.msg_max),
            ("load_queue.obj_max", load_queue.obj_max),
            ("load_queue.timeout_sec", load_queue.timeout_sec),
        ] {
            if value == 0 {
                return Err(invalid_config(path, format!("{field} must be at least 1")));
            }
        }

        let functions = FunctionSettings {
            runtime: functions.runtime.unwrap_or(defaults.functions.runtime),
            memory: functions.memory.unwrap_or(defaults.functions.memory),
            timeout_sec: functions
                .timeout_sec
                .unwrap_or(defaults.functions.timeout_sec),
        };
        if functions.timeout_sec == 0 || functions.timeout_sec > 540 {
            return Err(invalid_config(
                path,
                "functions.timeout_sec must be between 1 and 540",
            ));
        }

        Ok(Settings {
            file_path: None,
            region,
            psql: PsqlSettings {
                tier: psql.tier.unwrap_or(defaults.psql.tier),
                version: psql.version.unwrap_or(defaults.psql.version),
            },
            functions,
            load_queue,
            smtp: SmtpSettings {
                host: smtp.host.unwrap_or(defaults.smtp.host),
                port: smtp.port.unwrap_or(defaults.smtp.port),
                user: smtp.user.unwrap_or(defaults.smtp.user),
                from_addr: smtp.from_addr.unwrap_or(defaults.smtp.from_addr),
            },
            dashboard: DashboardSettings {
                image: dashboard.image.unwrap_or(defaults.dashboard.image),
            },
            schedules: ScheduleSettings {
                load_queue: schedules
                    .load_queue
                    .unwrap_or(defaults.schedules.load_queue),
                pick_notifications: schedules
                    .pick_notifications
                    .unwrap_or(defaults.schedules.pick_notifications),
                archive: schedules.archive.unwrap_or(defaults.schedules.archive),
                cost_mon: schedules.cost_mon.unwrap_or(defaults.schedules.cost_mon),
            },
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_settings(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, contents).expect("write settings");
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = write_settings(&dir, "");
        let settings = load_settings(&path).expect("load settings");
        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.load_queue.msg_max, DEFAULT_LOAD_QUEUE_MSG_MAX);
        assert_eq!(settings.file_path.as_deref(), Some(path.as_path()));
        assert!(settings.warnings.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let dir = tempdir().unwrap();
        let path = write_settings(
            &dir,
            r#"
region = "europe-west1"

[psql]
tier = "db-custom-2-7680"

[load_queue]
obj_max = 1024

[smtp]
port = 465
"#,
        );
        let settings = load_settings(&path).expect("load settings");
        assert_eq!(settings.region, "europe-west1");
        assert_eq!(settings.psql.tier, "db-custom-2-7680");
        assert_eq!(settings.psql.version, DEFAULT_PSQL_VERSION);
        assert_eq!(settings.load_queue.obj_max, 1024);
        assert_eq!(settings.load_queue.msg_max, DEFAULT_LOAD_QUEUE_MSG_MAX);
        assert_eq!(settings.smtp.port, 465);
    }

    #[test]
    fn unknown_fields_become_warnings() {
        let dir = tempdir().unwrap();
        let path = write_settings(
            &dir,
            r#"
zone = "a"

[psql]
replicas = 3
"#,
        );
        let settings = load_settings(&path).expect("load settings");
        assert_eq!(settings.warnings.len(), 2);
        assert!(settings.warnings[0].contains("`zone`"));
        assert!(settings.warnings[1].contains("[psql]"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_settings(&dir, "[load_queue]\nmsg_max = 0\n");
        match load_settings(&path) {
            Err(Error::InvalidConfig { message, .. }) => {
                assert!(message.contains("load_queue.msg_max"), "{message}");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = write_settings(&dir, "region = ");
        assert!(matches!(
            load_settings(&path),
            Err(Error::ParseConfig { .. })
        ));
    }

    #[test]
    fn discovery_walks_up_from_nested_directory() {
        let dir = tempdir().unwrap();
        let path = write_settings(&dir, "");
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_settings_file(&nested), Some(path));
    }
}
