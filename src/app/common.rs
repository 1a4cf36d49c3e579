use std::path::PathBuf;

use crate::cli::InstallationArgs;
use crate::core::diagnostics::{Diagnostic, Severity};
use crate::core::options::{ConfigLoadOptions, InstallationOptions};

pub fn config_load_options(config_override: Option<&PathBuf>) -> ConfigLoadOptions {
    match config_override {
        Some(path) => ConfigLoadOptions::explicit(path.clone()),
        None => ConfigLoadOptions::discover(),
    }
}

pub fn installation_options(
    args: InstallationArgs,
    config_override: Option<&PathBuf>,
) -> InstallationOptions {
    let mut options = InstallationOptions::new(args.project, args.namespace);
    options.test = args.test;
    options.smtp_mocked = args.smtp_mocked;
    options.smtp_to_addrs = args.smtp_to_addrs;
    options.extra_cc = args.extra_cc;
    options.cost_thresholds = args.cost_thresholds;
    options.heavy_asserts = args.heavy_asserts;
    options.updated_publish = !args.no_updated_publish;
    options.log_level = args.log_level;
    options.config = config_load_options(config_override);
    options
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Warning => {
                match &diagnostic.path {
                    Some(path) => eprintln!("Warning: {}: {}", path.display(), diagnostic.message),
                    None => eprintln!("Warning: {}", diagnostic.message),
                }
                if let Some(help) = &diagnostic.help {
                    eprintln!("         {help}");
                }
            }
            // stdout carries env documents and section listings; keep it clean.
            Severity::Info => {
                eprintln!("{}", diagnostic.message);
                if let Some(help) = &diagnostic.help {
                    eprintln!("{help}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::ConfigSource;

    fn args() -> InstallationArgs {
        InstallationArgs {
            project: "kernelci-staging".into(),
            namespace: "kcidb".into(),
            test: true,
            smtp_mocked: false,
            smtp_to_addrs: None,
            extra_cc: Some("kernelci-results-staging@groups.io".into()),
            cost_thresholds: None,
            heavy_asserts: false,
            no_updated_publish: true,
            log_level: "DEBUG".into(),
        }
    }

    #[test]
    fn installation_options_invert_updated_publish() {
        let options = installation_options(args(), None);
        assert!(options.test);
        assert!(!options.updated_publish);
        assert_eq!(options.log_level, "DEBUG");
        assert!(matches!(options.config.source, ConfigSource::Discover));
    }

    #[test]
    fn config_override_is_explicit() {
        let path = PathBuf::from("/etc/kcidb-cloud.toml");
        let options = installation_options(args(), Some(&path));
        match options.config.source {
            ConfigSource::Explicit(explicit) => assert_eq!(explicit, path),
            other => panic!("unexpected source: {other:?}"),
        }
    }
}
