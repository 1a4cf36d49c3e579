use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use kcidb_cloud::app;
use kcidb_cloud::cli::{Cli, Commands};

const LOG_ENV: &str = "KCIDB_CLOUD_LOG";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let Cli {
        config,
        verbose,
        command,
    } = cli;

    init_logging(verbose);

    let command = match command {
        Some(cmd) => cmd,
        None => {
            let mut command = Cli::command();
            let _ = command.print_help();
            println!();
            return ExitCode::FAILURE;
        }
    };

    let name = command_name(&command);
    let exit = match command {
        Commands::Deploy(args) => {
            app::handle_deploy(args, config.as_ref()).map(|()| ExitCode::SUCCESS)
        }
        Commands::Shutdown(args) => {
            app::handle_shutdown(args, config.as_ref()).map(|()| ExitCode::SUCCESS)
        }
        Commands::Withdraw(args) => {
            app::handle_withdraw(args, config.as_ref()).map(|()| ExitCode::SUCCESS)
        }
        Commands::Env(args) => app::handle_env(args, config.as_ref()).map(|()| ExitCode::SUCCESS),
        Commands::Shell(args) => app::handle_shell(args, config.as_ref()),
        Commands::ListSections(args) => {
            app::handle_list_sections(args).map(|()| ExitCode::SUCCESS)
        }
    };

    match exit {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            if err.is_usage() {
                eprintln!("\n{}", usage(name));
            }
            app::error::exit_code(&err)
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Deploy(_) => "deploy",
        Commands::Shutdown(_) => "shutdown",
        Commands::Withdraw(_) => "withdraw",
        Commands::Env(_) => "env",
        Commands::Shell(_) => "shell",
        Commands::ListSections(_) => "list-sections",
    }
}

/// Usage synopsis of the subcommand `name`, or of the whole tool.
fn usage(name: &str) -> String {
    let mut command = Cli::command();
    command.build();
    match command.find_subcommand_mut(name) {
        Some(subcommand) => subcommand.render_usage().to_string(),
        None => command.render_usage().to_string(),
    }
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
