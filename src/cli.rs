use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::core::shell::{DEFAULT_PROXY_PORT, DEFAULT_PROXY_PROGRAM};

const VERSION: &str = env!("KCIDB_CLOUD_VERSION");

/// Top-level CLI definition for the `kcidb-cloud` tool.
#[derive(Debug, Parser)]
#[command(
    name = "kcidb-cloud",
    version = VERSION,
    about = "Deploy, reconfigure and withdraw KCIDB installations on Google Cloud.",
    long_about = "kcidb-cloud derives every resource name of an installation from a project ID \
                  and a namespace, and provisions, stops or deletes them section by section.\n\
                  Run `kcidb-cloud list-sections` to see the sections --sections can select."
)]
pub struct Cli {
    /// Path to an explicit settings file. Defaults to searching for `kcidb-cloud.toml`.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        help = "Load settings from PATH instead of searching parent directories for kcidb-cloud.toml"
    )]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (`-v` debug, `-vv` trace). `KCIDB_CLOUD_LOG` takes precedence.
    #[arg(global = true, short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or update an installation.
    Deploy(DeployArgs),
    /// Stop serving: delete functions and the dashboard, revoke submitter grants.
    Shutdown(PlanArgs),
    /// Delete an installation, including its databases and secrets.
    Withdraw(PlanArgs),
    /// Print the environment handed to the installation's functions.
    Env(EnvArgs),
    /// Run a shell with the installation's environment and a database tunnel.
    Shell(ShellArgs),
    /// List provisioning sections, optionally filtered by a glob.
    ListSections(ListSectionsArgs),
}

#[derive(Debug, Args)]
pub struct InstallationArgs {
    /// Google Cloud project ID.
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Namespace prefixed to every resource name.
    #[arg(value_name = "NAMESPACE")]
    pub namespace: String,

    #[arg(long, help = "Add clean and empty test databases to the installation")]
    pub test: bool,

    #[arg(
        long,
        help = "Deliver notifications to a Pub/Sub topic instead of the SMTP relay"
    )]
    pub smtp_mocked: bool,

    #[arg(
        long,
        value_name = "ADDRS",
        help = "Send all notifications to ADDRS instead of their computed recipients"
    )]
    pub smtp_to_addrs: Option<String>,

    #[arg(
        long,
        value_name = "ADDRS",
        help = "Add ADDRS to the CC list of every notification"
    )]
    pub extra_cc: Option<String>,

    #[arg(
        long,
        value_name = "JSON",
        help = "Cost-monitor thresholds as a JSON array of [amount] or [amount, action] entries"
    )]
    pub cost_thresholds: Option<String>,

    #[arg(long, help = "Enable expensive consistency checks in the functions")]
    pub heavy_asserts: bool,

    #[arg(long, help = "Do not publish updates to the updated topic")]
    pub no_updated_publish: bool,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "INFO",
        help = "Python logging level for the functions"
    )]
    pub log_level: String,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub installation: InstallationArgs,

    #[arg(
        long,
        value_name = "GLOB",
        default_value = "*",
        help = "Only act on sections matching GLOB (extended globs such as `@(a|b)` and `!(a)` work)"
    )]
    pub sections: String,

    #[arg(
        long = "submitter",
        value_name = "NAME",
        help = "Service account allowed to publish submissions; repeatable"
    )]
    pub submitters: Vec<String>,

    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Directory holding the function sources"
    )]
    pub source: PathBuf,

    #[arg(
        long,
        value_name = "IMAGE",
        help = "Container image for the dashboard service, overriding the settings file"
    )]
    pub dashboard_image: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    #[arg(
        long,
        value_name = "PATH",
        help = "Read the SMTP password from PATH (`-` for stdin)"
    )]
    pub smtp_password_file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Read the PostgreSQL superuser password from PATH (`-` for stdin) instead of generating it"
    )]
    pub psql_password_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EnvArgs {
    #[command(flatten)]
    pub installation: InstallationArgs,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "yaml",
        help = "Output format: `yaml` or `sh`"
    )]
    pub format: String,
}

#[derive(Debug, Args)]
pub struct ShellArgs {
    #[command(flatten)]
    pub installation: InstallationArgs,

    #[arg(
        long,
        value_name = "PORT",
        default_value_t = DEFAULT_PROXY_PORT,
        help = "Local port for the Cloud SQL proxy"
    )]
    pub proxy_port: u16,

    #[arg(
        long,
        value_name = "PROGRAM",
        default_value = DEFAULT_PROXY_PROGRAM,
        help = "Cloud SQL proxy executable"
    )]
    pub proxy_program: String,

    /// Command to run instead of `$SHELL`.
    #[arg(
        value_name = "CMD",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListSectionsArgs {
    /// Shell glob selecting section names.
    #[arg(value_name = "GLOB", default_value = "*")]
    pub pattern: String,
}
