use std::path::PathBuf;
use std::process::ExitCode;

use crate::Result;
use crate::cli::ShellArgs;
use crate::core::operations;
use crate::core::options::ShellOptions;

use super::common::{emit_diagnostics, installation_options};
use super::display::ConsoleReporter;

/// Runs the session and forwards the child's exit status.
pub fn handle_shell(args: ShellArgs, config_override: Option<&PathBuf>) -> Result<ExitCode> {
    let mut options = ShellOptions::new(installation_options(args.installation, config_override));
    options.command = args.command;
    options.proxy_port = args.proxy_port;
    options.proxy_program = args.proxy_program;

    let mut reporter = ConsoleReporter::new();
    let output = operations::shell(options, Some(&mut reporter))?;
    emit_diagnostics(&output.diagnostics);

    log::debug!(
        "`{}` exited with status {}",
        output.value.program,
        output.value.exit_code
    );
    Ok(ExitCode::from(status_byte(output.value.exit_code)))
}

fn status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_outside_byte_range_maps_to_failure() {
        assert_eq!(status_byte(0), 0);
        assert_eq!(status_byte(130), 130);
        assert_eq!(status_byte(-1), 1);
        assert_eq!(status_byte(256), 1);
    }
}
