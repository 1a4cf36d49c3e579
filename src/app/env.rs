use std::path::PathBuf;

use crate::Result;
use crate::cli::EnvArgs;
use crate::core::environment::EnvFormat;
use crate::core::operations;
use crate::core::options::EnvOptions;

use super::common::{emit_diagnostics, installation_options};

pub fn handle_env(args: EnvArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let format: EnvFormat = args.format.parse()?;
    let options = EnvOptions {
        installation: installation_options(args.installation, config_override),
        format,
    };

    let output = operations::env(options)?;
    emit_diagnostics(&output.diagnostics);
    print!("{}", output.value.rendered);
    Ok(())
}
