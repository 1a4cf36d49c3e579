use std::io::{self, IsTerminal, Write};

use crate::core::events::Event;
use crate::core::reporter::Reporter;

pub fn colorize(value: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{code}m{value}\u{1b}[0m")
    } else {
        value.to_string()
    }
}

/// Prints plan progress to stderr as the provider calls happen.
pub struct ConsoleReporter {
    colored: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            colored: io::stderr().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { colored: false }
    }

    pub fn format_event(&self, event: &Event) -> Option<String> {
        let line = match event {
            Event::PreflightCompleted {
                psql_instance_exists,
            } => {
                if *psql_instance_exists {
                    "Project prerequisites ready.".to_string()
                } else {
                    "Project prerequisites ready; Cloud SQL instance will be created.".to_string()
                }
            }
            Event::StepStarted { action, section } => {
                format!("{} {section}", self.paint(&format!("{action}:"), "1"))
            }
            Event::StepSkipped { .. } => return None,
            Event::StepCompleted {
                section, changes, ..
            } => format!("  {section}: {changes}"),
            Event::ResourceCreated { resource } => {
                format!("  {} {resource}", self.paint("+", "32"))
            }
            Event::ResourceUpdated { resource } => {
                format!("  {} {resource}", self.paint("~", "36"))
            }
            Event::ResourceDeleted { resource } => {
                format!("  {} {resource}", self.paint("-", "31"))
            }
            Event::ResourceUnchanged { .. } | Event::ResourceAbsent { .. } => return None,
            Event::SecretGenerated { role, name } => {
                format!("  {} generated {role} in `{name}`", self.paint("+", "32"))
            }
            Event::SecretStored { role, name } => {
                format!("  {} stored {role} in `{name}`", self.paint("~", "36"))
            }
            Event::SecretRetained { role, name } => {
                format!("  = kept existing {role} in `{name}`")
            }
            Event::PasswordReset { instance, user } => {
                format!("  {} reset password of `{user}` on `{instance}`", self.paint("~", "36"))
            }
            Event::ProxyReady { program, port } => {
                format!("`{program}` listening on 127.0.0.1:{port}")
            }
        };
        Some(line)
    }

    fn paint(&self, value: &str, code: &str) -> String {
        colorize(value, code, self.colored)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: Event) {
        if let Some(line) = self.format_event(&event) {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}
