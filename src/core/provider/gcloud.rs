use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::{debug, trace};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;

use super::{ControlPlane, FunctionTrigger, IamTarget, Resource, RunServiceSpec};
use crate::core::environment::{EnvFormat, shell_quote};
use crate::error::{Error, Result};

const GCLOUD: &str = "gcloud";
const BQ: &str = "bq";

/// Label carrying the digest of the environment a function was deployed with.
pub const ENV_DIGEST_LABEL: &str = "kcidb-env";

/// Control plane driving the `gcloud` and `bq` command-line tools.
#[derive(Debug, Clone)]
pub struct GcloudControlPlane {
    project: String,
    gcloud: String,
    bq: String,
}

struct ProcessOutput {
    stdout: String,
}

enum Lookup {
    Found(ProcessOutput),
    Missing,
}

impl GcloudControlPlane {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            gcloud: GCLOUD.to_string(),
            bq: BQ.to_string(),
        }
    }

    /// Override the tool executables, e.g. to point at wrappers.
    pub fn with_programs(mut self, gcloud: impl Into<String>, bq: impl Into<String>) -> Self {
        self.gcloud = gcloud.into();
        self.bq = bq.into();
        self
    }

    fn gcloud_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        full.push(format!("--project={}", self.project));
        full.push("--quiet".to_string());
        full
    }

    fn gcloud(&self, args: Vec<String>) -> Result<ProcessOutput> {
        run_command(&self.gcloud, &self.gcloud_args(&args), None)
    }

    fn gcloud_with_stdin(&self, args: Vec<String>, stdin: &str) -> Result<ProcessOutput> {
        run_command(&self.gcloud, &self.gcloud_args(&args), Some(stdin))
    }

    fn gcloud_lookup(&self, args: Vec<String>) -> Result<Lookup> {
        lookup(self.gcloud(args))
    }

    fn bq(&self, args: Vec<String>) -> Result<ProcessOutput> {
        let mut full = vec![format!("--project_id={}", self.project), "--quiet".to_string()];
        full.extend(args);
        run_command(&self.bq, &full, None)
    }

    fn dataset_ref(&self, name: &str) -> String {
        format!("{}:{name}", self.project)
    }

    fn access_secret(&self, name: &str) -> Result<String> {
        let output = self.gcloud(args([
            "secrets",
            "versions",
            "access",
            "latest",
            &format!("--secret={name}"),
        ]))?;
        Ok(output.stdout)
    }

    fn binding_present(&self, target: &IamTarget, member: &str, role: &str) -> Result<bool> {
        let mut command = match target {
            IamTarget::Project => args(["projects", "get-iam-policy", &self.project]),
            IamTarget::Topic(topic) => args(["pubsub", "topics", "get-iam-policy", topic]),
            IamTarget::Bucket(bucket) => args([
                "storage",
                "buckets",
                "get-iam-policy",
                &format!("gs://{bucket}"),
            ]),
        };
        command.push("--format=json".to_string());
        let repr = command.join(" ");
        // Bindings disappear with the bucket or topic that carried them.
        let Lookup::Found(output) = self.gcloud_lookup(command)? else {
            return Ok(false);
        };
        let policy: IamPolicy =
            serde_json::from_str(&output.stdout).map_err(|err| Error::ProviderOutput {
                command: repr,
                message: format!("IAM policy is not valid JSON: {err}"),
            })?;
        Ok(policy.grants(member, role))
    }

    fn change_binding(&self, verb: &str, target: &IamTarget, member: &str, role: &str) -> Result<()> {
        let mut command = match target {
            IamTarget::Project => args(["projects", verb, &self.project]),
            IamTarget::Topic(topic) => args(["pubsub", "topics", verb, topic]),
            IamTarget::Bucket(bucket) => {
                args(["storage", "buckets", verb, &format!("gs://{bucket}")])
            }
        };
        command.push(format!("--member={member}"));
        command.push(format!("--role={role}"));
        if matches!(target, IamTarget::Project) {
            command.push("--condition=None".to_string());
        }
        self.gcloud(command).map(drop)
    }

    /// Write `flags` to a private file for `--flags-file`, keeping secret values out
    /// of the process table.
    fn secret_flags(&self, label: &str, flags: &[(&str, &str)]) -> Result<NamedTempFile> {
        let mut mapping = Mapping::new();
        for (flag, value) in flags {
            mapping.insert(
                Value::String((*flag).to_string()),
                Value::String((*value).to_string()),
            );
        }
        let contents = serde_yaml::to_string(&mapping).map_err(|err| Error::ProviderOutput {
            command: format!("{} --flags-file", self.gcloud),
            message: format!("flags file could not be rendered: {err}"),
        })?;
        temp_file(label, &contents)
    }

    fn deploy_run_service(&self, spec: &RunServiceSpec) -> Result<()> {
        let mut command = args([
            "run",
            "deploy",
            &spec.name,
            &format!("--image={}", spec.image),
            &format!("--region={}", spec.region),
            &format!("--service-account={}", spec.service_account),
            &format!("--add-cloudsql-instances={}", spec.cloudsql_instance),
            "--allow-unauthenticated",
        ]);
        if !spec.env.is_empty() {
            let pairs: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
            command.push(format!("--set-env-vars=^|^{}", pairs.join("|")));
        }
        if !spec.secret_env.is_empty() {
            let pairs: Vec<String> = spec
                .secret_env
                .iter()
                .map(|(k, secret)| format!("{k}={secret}:latest"))
                .collect();
            command.push(format!("--set-secrets={}", pairs.join(",")));
        }
        self.gcloud(command).map(drop)
    }

    fn deploy_function(&self, spec: &super::FunctionSpec) -> Result<()> {
        let env_file = temp_file(&spec.name, &spec.environment.render(EnvFormat::Yaml)?)?;
        let mut command = args([
            "functions",
            "deploy",
            &spec.name,
            "--no-gen2",
            &format!("--region={}", spec.region),
            &format!("--runtime={}", spec.runtime),
            &format!("--entry-point={}", spec.entry_point),
            &format!("--memory={}", spec.memory),
            &format!("--timeout={}s", spec.timeout_sec),
            &format!("--service-account={}", spec.service_account),
            &format!("--docker-repository={}", spec.docker_repository),
            &format!("--update-labels={ENV_DIGEST_LABEL}={}", spec.environment.digest()),
        ]);
        command.push(format!("--source={}", spec.source.display()));
        command.push(format!("--env-vars-file={}", env_file.path().display()));
        match &spec.trigger {
            FunctionTrigger::Topic(topic) => command.push(format!("--trigger-topic={topic}")),
            FunctionTrigger::Http => {
                command.push("--trigger-http".to_string());
                command.push("--allow-unauthenticated".to_string());
            }
        }
        self.gcloud(command).map(drop)
    }
}

impl ControlPlane for GcloudControlPlane {
    fn exists(&mut self, resource: &Resource) -> Result<bool> {
        let looked_up = match resource {
            Resource::Service { name } => {
                let output = self.gcloud(args([
                    "services",
                    "list",
                    "--enabled",
                    &format!("--filter=config.name:{name}"),
                    "--format=value(config.name)",
                ]))?;
                return Ok(output.stdout.lines().any(|line| line.trim() == name));
            }
            Resource::AppEngine { .. } => self.gcloud_lookup(args(["app", "describe"]))?,
            Resource::ServiceAccount { email, .. } => {
                self.gcloud_lookup(args(["iam", "service-accounts", "describe", email]))?
            }
            Resource::IamBinding {
                target,
                member,
                role,
            } => return self.binding_present(target, member, role),
            Resource::Secret { name } => self.gcloud_lookup(args(["secrets", "describe", name]))?,
            Resource::PsqlInstance { name, .. } => {
                self.gcloud_lookup(args(["sql", "instances", "describe", name]))?
            }
            Resource::PsqlDatabase { instance, name } => self.gcloud_lookup(args([
                "sql",
                "databases",
                "describe",
                name,
                &format!("--instance={instance}"),
            ]))?,
            Resource::PsqlUser { instance, name, .. } => {
                let listed = self.gcloud_lookup(args([
                    "sql",
                    "users",
                    "list",
                    &format!("--instance={instance}"),
                    "--format=value(name)",
                ]))?;
                return Ok(match listed {
                    Lookup::Found(output) => output.stdout.lines().any(|line| line.trim() == name),
                    Lookup::Missing => false,
                });
            }
            Resource::BigQueryDataset { name, .. } => {
                lookup(self.bq(args(["show", "--format=none", &self.dataset_ref(name)])))?
            }
            Resource::ArtifactRepository { name, location, .. } => self.gcloud_lookup(args([
                "artifacts",
                "repositories",
                "describe",
                name,
                &format!("--location={location}"),
            ]))?,
            Resource::RunService(spec) => self.gcloud_lookup(args([
                "run",
                "services",
                "describe",
                &spec.name,
                &format!("--region={}", spec.region),
            ]))?,
            Resource::Topic { name } => {
                self.gcloud_lookup(args(["pubsub", "topics", "describe", name]))?
            }
            Resource::Subscription { name, .. } => {
                self.gcloud_lookup(args(["pubsub", "subscriptions", "describe", name]))?
            }
            Resource::Bucket { name, .. } => self.gcloud_lookup(args([
                "storage",
                "buckets",
                "describe",
                &format!("gs://{name}"),
            ]))?,
            Resource::Function(spec) => self.gcloud_lookup(args([
                "functions",
                "describe",
                &spec.name,
                &format!("--region={}", spec.region),
            ]))?,
            Resource::SchedulerJob { name, region, .. } => self.gcloud_lookup(args([
                "scheduler",
                "jobs",
                "describe",
                name,
                &format!("--location={region}"),
            ]))?,
        };
        Ok(matches!(looked_up, Lookup::Found(_)))
    }

    fn create(&mut self, resource: &Resource) -> Result<()> {
        match resource {
            Resource::Service { name } => self.gcloud(args(["services", "enable", name])).map(drop),
            Resource::AppEngine { region } => self
                .gcloud(args([
                    "app",
                    "create",
                    &format!("--region={}", app_engine_region(region)),
                ]))
                .map(drop),
            Resource::ServiceAccount {
                id, display_name, ..
            } => self
                .gcloud(args([
                    "iam",
                    "service-accounts",
                    "create",
                    id,
                    &format!("--display-name={display_name}"),
                ]))
                .map(drop),
            Resource::IamBinding {
                target,
                member,
                role,
            } => self.change_binding("add-iam-policy-binding", target, member, role),
            Resource::Secret { name } => self
                .gcloud(args([
                    "secrets",
                    "create",
                    name,
                    "--replication-policy=automatic",
                ]))
                .map(drop),
            Resource::PsqlInstance {
                name,
                region,
                version,
                tier,
                root_password_secret,
            } => {
                let password = self.access_secret(root_password_secret)?;
                let flags = self.secret_flags(name, &[("--root-password", &password)])?;
                self.gcloud(args([
                    "sql",
                    "instances",
                    "create",
                    name,
                    &format!("--database-version={version}"),
                    &format!("--tier={tier}"),
                    &format!("--region={region}"),
                    &format!("--flags-file={}", flags.path().display()),
                ]))
                .map(drop)
            }
            Resource::PsqlDatabase { instance, name } => self
                .gcloud(args([
                    "sql",
                    "databases",
                    "create",
                    name,
                    &format!("--instance={instance}"),
                ]))
                .map(drop),
            Resource::PsqlUser {
                instance,
                name,
                password_secret,
            } => {
                let password = self.access_secret(password_secret)?;
                let flags = self.secret_flags(name, &[("--password", &password)])?;
                self.gcloud(args([
                    "sql",
                    "users",
                    "create",
                    name,
                    &format!("--instance={instance}"),
                    &format!("--flags-file={}", flags.path().display()),
                ]))
                .map(drop)
            }
            Resource::BigQueryDataset {
                name,
                location,
                description,
            } => self
                .bq(args([
                    "mk",
                    "--dataset",
                    &format!("--location={location}"),
                    &format!("--description={description}"),
                    &self.dataset_ref(name),
                ]))
                .map(drop),
            Resource::ArtifactRepository {
                name,
                location,
                description,
            } => self
                .gcloud(args([
                    "artifacts",
                    "repositories",
                    "create",
                    name,
                    "--repository-format=docker",
                    &format!("--location={location}"),
                    &format!("--description={description}"),
                ]))
                .map(drop),
            Resource::RunService(spec) => self.deploy_run_service(spec),
            Resource::Topic { name } => {
                self.gcloud(args(["pubsub", "topics", "create", name])).map(drop)
            }
            Resource::Subscription {
                name,
                topic,
                ack_deadline_sec,
                retention,
            } => self
                .gcloud(args([
                    "pubsub",
                    "subscriptions",
                    "create",
                    name,
                    &format!("--topic={topic}"),
                    &format!("--ack-deadline={ack_deadline_sec}"),
                    &format!("--message-retention-duration={retention}"),
                ]))
                .map(drop),
            Resource::Bucket { name, location } => self
                .gcloud(args([
                    "storage",
                    "buckets",
                    "create",
                    &format!("gs://{name}"),
                    &format!("--location={location}"),
                    "--uniform-bucket-level-access",
                ]))
                .map(drop),
            Resource::Function(spec) => self.deploy_function(spec),
            Resource::SchedulerJob {
                name,
                region,
                schedule,
                topic,
                message_body,
            } => self
                .gcloud(args([
                    "scheduler",
                    "jobs",
                    "create",
                    "pubsub",
                    name,
                    &format!("--location={region}"),
                    &format!("--schedule={schedule}"),
                    &format!("--topic={topic}"),
                    &format!("--message-body={message_body}"),
                ]))
                .map(drop),
        }
    }

    fn update(&mut self, resource: &Resource) -> Result<()> {
        match resource {
            Resource::PsqlInstance { name, tier, .. } => self
                .gcloud(args([
                    "sql",
                    "instances",
                    "patch",
                    name,
                    &format!("--tier={tier}"),
                ]))
                .map(drop),
            Resource::BigQueryDataset {
                name, description, ..
            } => self
                .bq(args([
                    "update",
                    &format!("--description={description}"),
                    &self.dataset_ref(name),
                ]))
                .map(drop),
            Resource::ArtifactRepository {
                name,
                location,
                description,
            } => self
                .gcloud(args([
                    "artifacts",
                    "repositories",
                    "update",
                    name,
                    &format!("--location={location}"),
                    &format!("--description={description}"),
                ]))
                .map(drop),
            Resource::RunService(spec) => self.deploy_run_service(spec),
            Resource::Subscription {
                name,
                ack_deadline_sec,
                retention,
                ..
            } => self
                .gcloud(args([
                    "pubsub",
                    "subscriptions",
                    "update",
                    name,
                    &format!("--ack-deadline={ack_deadline_sec}"),
                    &format!("--message-retention-duration={retention}"),
                ]))
                .map(drop),
            Resource::Function(spec) => self.deploy_function(spec),
            Resource::SchedulerJob {
                name,
                region,
                schedule,
                topic,
                message_body,
            } => self
                .gcloud(args([
                    "scheduler",
                    "jobs",
                    "update",
                    "pubsub",
                    name,
                    &format!("--location={region}"),
                    &format!("--schedule={schedule}"),
                    &format!("--topic={topic}"),
                    &format!("--message-body={message_body}"),
                ]))
                .map(drop),
            other => Err(Error::ProviderOutput {
                command: format!("update {}", other.key()),
                message: format!("{} resources cannot be updated in place", other.kind()),
            }),
        }
    }

    fn delete(&mut self, resource: &Resource) -> Result<()> {
        match resource {
            Resource::Service { name } => {
                self.gcloud(args(["services", "disable", name])).map(drop)
            }
            Resource::AppEngine { .. } => Err(Error::ProviderOutput {
                command: "app delete".to_string(),
                message: "App Engine applications cannot be deleted".to_string(),
            }),
            Resource::ServiceAccount { email, .. } => self
                .gcloud(args(["iam", "service-accounts", "delete", email]))
                .map(drop),
            Resource::IamBinding {
                target,
                member,
                role,
            } => self.change_binding("remove-iam-policy-binding", target, member, role),
            Resource::Secret { name } => self.gcloud(args(["secrets", "delete", name])).map(drop),
            Resource::PsqlInstance { name, .. } => self
                .gcloud(args(["sql", "instances", "delete", name]))
                .map(drop),
            Resource::PsqlDatabase { instance, name } => self
                .gcloud(args([
                    "sql",
                    "databases",
                    "delete",
                    name,
                    &format!("--instance={instance}"),
                ]))
                .map(drop),
            Resource::PsqlUser { instance, name, .. } => self
                .gcloud(args([
                    "sql",
                    "users",
                    "delete",
                    name,
                    &format!("--instance={instance}"),
                ]))
                .map(drop),
            Resource::BigQueryDataset { name, .. } => self
                .bq(args(["rm", "-r", "-f", "--dataset", &self.dataset_ref(name)]))
                .map(drop),
            Resource::ArtifactRepository { name, location, .. } => self
                .gcloud(args([
                    "artifacts",
                    "repositories",
                    "delete",
                    name,
                    &format!("--location={location}"),
                ]))
                .map(drop),
            Resource::RunService(spec) => self
                .gcloud(args([
                    "run",
                    "services",
                    "delete",
                    &spec.name,
                    &format!("--region={}", spec.region),
                ]))
                .map(drop),
            Resource::Topic { name } => {
                self.gcloud(args(["pubsub", "topics", "delete", name])).map(drop)
            }
            Resource::Subscription { name, .. } => self
                .gcloud(args(["pubsub", "subscriptions", "delete", name]))
                .map(drop),
            Resource::Bucket { name, .. } => self
                .gcloud(args(["storage", "rm", "--recursive", &format!("gs://{name}")]))
                .map(drop),
            Resource::Function(spec) => self
                .gcloud(args([
                    "functions",
                    "delete",
                    &spec.name,
                    &format!("--region={}", spec.region),
                ]))
                .map(drop),
            Resource::SchedulerJob { name, region, .. } => self
                .gcloud(args([
                    "scheduler",
                    "jobs",
                    "delete",
                    name,
                    &format!("--location={region}"),
                ]))
                .map(drop),
        }
    }

    fn secret_has_value(&mut self, name: &str) -> Result<bool> {
        let looked_up = self.gcloud_lookup(args([
            "secrets",
            "versions",
            "list",
            name,
            "--filter=state:enabled",
            "--limit=1",
            "--format=value(name)",
        ]))?;
        Ok(match looked_up {
            Lookup::Found(output) => !output.stdout.trim().is_empty(),
            Lookup::Missing => false,
        })
    }

    fn add_secret_version(&mut self, name: &str, value: &str) -> Result<()> {
        self.gcloud_with_stdin(
            args(["secrets", "versions", "add", name, "--data-file=-"]),
            value,
        )
        .map(drop)
    }

    fn secret_value(&mut self, name: &str) -> Result<String> {
        self.access_secret(name)
    }

    fn reset_password(&mut self, instance: &str, user: &str, password_secret: &str) -> Result<()> {
        let password = self.access_secret(password_secret)?;
        let flags = self.secret_flags(user, &[("--password", &password)])?;
        self.gcloud(args([
            "sql",
            "users",
            "set-password",
            user,
            &format!("--instance={instance}"),
            &format!("--flags-file={}", flags.path().display()),
        ]))
        .map(drop)
    }
}

#[derive(Debug, Default, Deserialize)]
struct IamPolicy {
    #[serde(default)]
    bindings: Vec<IamPolicyBinding>,
}

#[derive(Debug, Deserialize)]
struct IamPolicyBinding {
    role: String,
    #[serde(default)]
    members: Vec<String>,
}

impl IamPolicy {
    fn grants(&self, member: &str, role: &str) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.role == role && binding.members.iter().any(|m| m == member))
    }
}

/// Owner-only YAML file handed to `--env-vars-file` or `--flags-file`, removed on drop.
fn temp_file(label: &str, contents: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("kcidb-cloud-{label}-"))
        .suffix(".yaml")
        .tempfile()
        .map_err(|source| Error::WriteTempFile {
            path: std::env::temp_dir(),
            source,
        })?;
    let path: PathBuf = file.path().to_path_buf();
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|source| Error::WriteTempFile { path, source })?;
    Ok(file)
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// App Engine names `us-central1` and `europe-west1` without the trailing digit.
fn app_engine_region(region: &str) -> &str {
    match region {
        "us-central1" => "us-central",
        "europe-west1" => "europe-west",
        other => other,
    }
}

fn lookup(result: Result<ProcessOutput>) -> Result<Lookup> {
    match result {
        Ok(output) => Ok(Lookup::Found(output)),
        Err(Error::ProviderFailed { stderr, .. }) if is_not_found(&stderr) => Ok(Lookup::Missing),
        Err(err) => Err(err),
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    stderr.contains("NOT_FOUND") || lower.contains("not found") || lower.contains("does not exist")
}

fn run_command(program: &str, args: &[String], stdin: Option<&str>) -> Result<ProcessOutput> {
    let command_repr = format_cli(program, args);
    debug!("running {command_repr}");

    let mut command = Command::new(program);
    command.args(args);
    command.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let spawn_error = |source: io::Error| Error::ProviderSpawn {
        program: program.to_string(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_error)?;
    if let (Some(value), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(value.as_bytes()).map_err(spawn_error)?;
    }
    let output = child.wait_with_output().map_err(spawn_error)?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    trace!("{command_repr} exited with {}", output.status);

    if output.status.success() {
        Ok(ProcessOutput { stdout })
    } else {
        Err(Error::ProviderFailed {
            command: command_repr,
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Render a command line for logs and errors, masking password arguments.
fn format_cli(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string());
    for arg in args {
        let arg = match arg.split_once('=') {
            Some((flag, _)) if flag.ends_with("password") => format!("{flag}=********"),
            _ => arg.clone(),
        };
        if arg.chars().all(|ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '-' | '_' | '/' | '.' | ':' | '=' | ',' | '@' | '*')
        }) {
            parts.push(arg);
        } else {
            parts.push(shell_quote(&arg));
        }
    }
    parts.join(" ")
}
