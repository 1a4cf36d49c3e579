use std::path::Path;

use log::{debug, info};

use crate::config::{self, Settings};
use crate::error::{Error, Result};

use super::diagnostics::{Diagnostic, Severity};
use super::environment::{DatabaseHost, Environment, EnvironmentFlags};
use super::events::Event;
use super::namespace::{self, ResourceSet};
use super::options::{
    ConfigLoadOptions, ConfigSource, EnvOptions, InstallationOptions, ListSectionsOptions,
    PlanOptions, SecretFiles, ShellOptions,
};
use super::outcome::{
    EnvOutcome, ListSectionsOutcome, OperationOutput, OperationResult, PlanOutcome, ShellOutcome,
};
use super::plan::{Action, Plan};
use super::provider::ControlPlane;
use super::provision::{Features, StepContext, hosting, psql};
use super::reporter::Reporter;
use super::secrets::{SecretManager, SecretRole};
use super::sections::{self, SectionFilter};
use super::shell::{self, DatabaseProxy, ProxySpec};
use super::thresholds::CostThresholds;

/// List registered sections matching a glob. Makes no provider calls.
pub fn list_sections(options: ListSectionsOptions) -> OperationResult<ListSectionsOutcome> {
    let filter = SectionFilter::compile(&options.pattern)?;
    Ok(OperationOutput::new(ListSectionsOutcome {
        pattern: options.pattern,
        sections: sections::list(&filter),
    }))
}

/// Compile and render the environment document. Makes no provider calls.
pub fn env(options: EnvOptions) -> OperationResult<EnvOutcome> {
    let prepared = Prepared::load(&options.installation, DatabaseHost::CloudSqlSocket)?;
    let rendered = prepared.environment.render(options.format)?;
    Ok(OperationOutput::new(EnvOutcome {
        format: options.format,
        environment: prepared.environment,
        rendered,
        settings_path: prepared.settings.file_path,
    })
    .with_diagnostics(prepared.diagnostics))
}

/// Run a command (or `$SHELL`) with the environment exported and the database
/// reachable through a local proxy. Nothing is provisioned.
pub fn shell(
    options: ShellOptions,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<ShellOutcome> {
    let prepared = Prepared::load(
        &options.installation,
        DatabaseHost::Proxy {
            port: options.proxy_port,
        },
    )?;
    let spec = ProxySpec {
        program: options.proxy_program.clone(),
        connection_name: prepared
            .resources
            .psql_connection_name(&prepared.settings.region),
        port: options.proxy_port,
    };

    let mut events = Vec::new();
    let exit_code = {
        let mut reporter = ReporterProxy::new(reporter, &mut events);
        let _proxy = DatabaseProxy::start(&spec)?;
        reporter.emit(Event::ProxyReady {
            program: spec.program.clone(),
            port: spec.port,
        });
        shell::run_session(&prepared.environment, &options.command)?
    };

    let (program, _) = shell::session_command(&options.command);
    Ok(OperationOutput::new(ShellOutcome { program, exit_code })
        .with_diagnostics(prepared.diagnostics)
        .with_events(events))
}

/// Ensure project prerequisites, then run the deploy plan over the selected sections.
pub fn deploy(
    options: PlanOptions,
    control: &mut dyn ControlPlane,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PlanOutcome> {
    run_plan(Action::Deploy, options, control, reporter)
}

/// Stop serving: delete functions and run services and revoke submitter grants.
pub fn shutdown(
    options: PlanOptions,
    control: &mut dyn ControlPlane,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PlanOutcome> {
    run_plan(Action::Shutdown, options, control, reporter)
}

/// Delete every resource of the selected sections, in reverse deploy order.
pub fn withdraw(
    options: PlanOptions,
    control: &mut dyn ControlPlane,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PlanOutcome> {
    run_plan(Action::Withdraw, options, control, reporter)
}

fn run_plan(
    action: Action,
    options: PlanOptions,
    control: &mut dyn ControlPlane,
    reporter: Option<&mut dyn Reporter>,
) -> OperationResult<PlanOutcome> {
    let filter = SectionFilter::compile(&options.sections)?;
    let installation = &options.installation;
    let prepared = Prepared::load(installation, DatabaseHost::CloudSqlSocket)?;
    let secrets = match action {
        Action::Deploy => {
            secret_manager(&prepared.resources, installation.smtp_mocked, &options.secret_files)?
        }
        Action::Shutdown | Action::Withdraw => secret_manager(
            &prepared.resources,
            installation.smtp_mocked,
            &SecretFiles::default(),
        )?,
    };
    let features = Features {
        smtp_mocked: installation.smtp_mocked,
        submitters: options.submitters.clone(),
        source: options.source.clone(),
        dashboard_image: options
            .dashboard_image
            .clone()
            .unwrap_or_else(|| prepared.settings.dashboard.image.clone()),
    };

    info!(
        "{action} of {}/{} (sections `{}`)",
        installation.project,
        installation.namespace,
        filter.pattern()
    );

    let mut events = Vec::new();
    let (preflight, steps) = {
        let mut reporter = ReporterProxy::new(reporter, &mut events);

        let (preflight, psql_instance_exists) = if action == Action::Deploy {
            let summary = hosting::prepare(&prepared.settings, control, &mut reporter)?;
            let exists = psql::instance_exists(&prepared.resources, &prepared.settings, control)?;
            debug!("Cloud SQL instance present before deploy: {exists}");
            reporter.emit(Event::PreflightCompleted {
                psql_instance_exists: exists,
            });
            (Some(summary), exists)
        } else {
            (None, true)
        };

        let ctx = StepContext {
            resources: &prepared.resources,
            settings: &prepared.settings,
            environment: &prepared.environment,
            secrets: &secrets,
            features: &features,
            psql_instance_exists,
        };
        let steps = Plan::for_action(action).execute(&filter, &ctx, control, &mut reporter)?;
        (preflight, steps)
    };

    let mut diagnostics = prepared.diagnostics;
    if steps.iter().all(|step| step.skipped) {
        diagnostics.push(
            Diagnostic::new(
                Severity::Info,
                format!("No section matches `{}`; nothing to {action}.", filter.pattern()),
            )
            .with_help("Run `kcidb-cloud list-sections` to see section names."),
        );
    }

    Ok(OperationOutput::new(PlanOutcome {
        action,
        project: installation.project.clone(),
        namespace: installation.namespace.clone(),
        preflight,
        steps,
    })
    .with_diagnostics(diagnostics)
    .with_events(events))
}

/// Inputs every installation command derives before touching the provider.
struct Prepared {
    settings: Settings,
    resources: ResourceSet,
    environment: Environment,
    diagnostics: Vec<Diagnostic>,
}

impl Prepared {
    fn load(installation: &InstallationOptions, database_host: DatabaseHost) -> Result<Self> {
        let resources = namespace::derive(
            &installation.project,
            &installation.namespace,
            installation.test,
        )?;
        let cost_thresholds = installation
            .cost_thresholds
            .as_deref()
            .map(CostThresholds::parse)
            .transpose()?;
        let settings = load_settings(&installation.config)?;

        let diagnostics = settings
            .warnings
            .iter()
            .map(|warning| {
                let diagnostic = Diagnostic::new(Severity::Warning, warning.clone());
                match &settings.file_path {
                    Some(path) => diagnostic.with_path(path.clone()),
                    None => diagnostic,
                }
            })
            .collect();

        let flags = EnvironmentFlags {
            log_level: installation.log_level.clone(),
            heavy_asserts: installation.heavy_asserts,
            updated_publish: installation.updated_publish,
            smtp_mocked: installation.smtp_mocked,
            smtp_to_addrs: installation.smtp_to_addrs.clone(),
            extra_cc: installation.extra_cc.clone(),
            cost_thresholds,
            database_host,
        };
        let environment = Environment::compile(&resources, &flags, &settings);

        Ok(Self {
            settings,
            resources,
            environment,
            diagnostics,
        })
    }
}

fn load_settings(options: &ConfigLoadOptions) -> Result<Settings> {
    match &options.source {
        ConfigSource::Explicit(path) => {
            if !path.is_file() {
                return Err(Error::ExplicitConfigMissing { path: path.clone() });
            }
            config::load_settings(path)
        }
        ConfigSource::Discover => {
            let root = match &options.search_root {
                Some(root) => root.clone(),
                None => std::env::current_dir()
                    .map_err(|source| Error::WorkingDirectoryUnavailable { source })?,
            };
            match config::discover_settings_file(&root) {
                Some(path) => {
                    debug!("using settings from {}", path.display());
                    config::load_settings(&path)
                }
                None => Ok(Settings::default()),
            }
        }
    }
}

/// Bind every secret role the installation uses and read operator-supplied values.
fn secret_manager(
    resources: &ResourceSet,
    smtp_mocked: bool,
    files: &SecretFiles,
) -> Result<SecretManager> {
    let names = &resources.secrets;
    let mut secrets = SecretManager::new();
    secrets.ensure(SecretRole::PsqlSuperuser, &resources.project, &names.psql_superuser);
    secrets.ensure(SecretRole::PsqlEditor, &resources.project, &names.psql_editor);
    secrets.ensure(SecretRole::PsqlViewer, &resources.project, &names.psql_viewer);
    secrets.ensure(SecretRole::PsqlPgpass, &resources.project, &names.psql_pgpass);
    if !smtp_mocked {
        secrets.ensure(SecretRole::SmtpPassword, &resources.project, &names.smtp_password);
    }

    let supplied: [(SecretRole, Option<&Path>); 2] = [
        (SecretRole::PsqlSuperuser, files.psql_superuser.as_deref()),
        (SecretRole::SmtpPassword, files.smtp_password.as_deref()),
    ];
    for (role, path) in supplied {
        if let Some(path) = path {
            secrets.from_file(role, path)?;
        }
    }
    Ok(secrets)
}

pub(super) struct ReporterProxy<'a, 'b> {
    delegate: Option<&'a mut dyn Reporter>,
    events: &'b mut Vec<Event>,
}

impl<'a, 'b> ReporterProxy<'a, 'b> {
    fn new(delegate: Option<&'a mut dyn Reporter>, events: &'b mut Vec<Event>) -> Self {
        Self { delegate, events }
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event.clone());
        if let Some(reporter) = &mut self.delegate {
            reporter.report(event);
        }
    }
}

impl Reporter for ReporterProxy<'_, '_> {
    fn report(&mut self, event: Event) {
        self.emit(event);
    }
}
