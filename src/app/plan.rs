use std::path::PathBuf;

use crate::Result;
use crate::cli::{DeployArgs, PlanArgs};
use crate::core::operations;
use crate::core::options::{PlanOptions, SecretFiles};
use crate::core::outcome::PlanOutcome;
use crate::core::plan::Action;
use crate::core::provider::GcloudControlPlane;

use super::common::{emit_diagnostics, installation_options};
use super::display::ConsoleReporter;

pub fn handle_deploy(args: DeployArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let mut options = plan_options(args.plan, config_override);
    options.secret_files = SecretFiles {
        psql_superuser: args.psql_password_file,
        smtp_password: args.smtp_password_file,
    };
    run(Action::Deploy, options)
}

pub fn handle_shutdown(args: PlanArgs, config_override: Option<&PathBuf>) -> Result<()> {
    run(Action::Shutdown, plan_options(args, config_override))
}

pub fn handle_withdraw(args: PlanArgs, config_override: Option<&PathBuf>) -> Result<()> {
    run(Action::Withdraw, plan_options(args, config_override))
}

fn plan_options(args: PlanArgs, config_override: Option<&PathBuf>) -> PlanOptions {
    let mut options = PlanOptions::new(installation_options(args.installation, config_override));
    options.sections = args.sections;
    options.submitters = args.submitters;
    options.source = args.source;
    options.dashboard_image = args.dashboard_image;
    options
}

fn run(action: Action, options: PlanOptions) -> Result<()> {
    let mut control = GcloudControlPlane::new(&options.installation.project);
    let mut reporter = ConsoleReporter::new();
    let output = match action {
        Action::Deploy => operations::deploy(options, &mut control, Some(&mut reporter))?,
        Action::Shutdown => operations::shutdown(options, &mut control, Some(&mut reporter))?,
        Action::Withdraw => operations::withdraw(options, &mut control, Some(&mut reporter))?,
    };

    emit_diagnostics(&output.diagnostics);
    render_plan(&output.value);
    Ok(())
}

fn render_plan(outcome: &PlanOutcome) {
    let executed = outcome.executed().count();
    if executed == 0 {
        return;
    }
    eprintln!(
        "{} of {}/{} finished: {} section(s), {}.",
        capitalized(outcome.action),
        outcome.project,
        outcome.namespace,
        executed,
        outcome.totals()
    );
}

fn capitalized(action: Action) -> &'static str {
    match action {
        Action::Deploy => "Deploy",
        Action::Shutdown => "Shutdown",
        Action::Withdraw => "Withdrawal",
    }
}
