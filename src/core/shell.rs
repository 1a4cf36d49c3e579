//! Interactive sessions with the compiled environment and a database tunnel.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use libc::{self, pid_t};
use log::{debug, warn};

use super::environment::Environment;
use crate::error::{Error, Result};

pub const DEFAULT_PROXY_PROGRAM: &str = "cloud-sql-proxy";
pub const DEFAULT_PROXY_PORT: u16 = 5432;
const FALLBACK_SHELL: &str = "/bin/sh";

const PROXY_READY_TIMEOUT: Duration = Duration::from_secs(30);
const PROXY_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How to reach the Cloud SQL instance from this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub program: String,
    pub connection_name: String,
    pub port: u16,
}

/// A running `cloud-sql-proxy`; terminated on drop.
pub struct DatabaseProxy {
    program: String,
    child: Child,
}

impl DatabaseProxy {
    pub fn start(spec: &ProxySpec) -> Result<Self> {
        debug!(
            "starting {} for {} on port {}",
            spec.program, spec.connection_name, spec.port
        );
        let child = Command::new(&spec.program)
            .arg(&spec.connection_name)
            .arg("--port")
            .arg(spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|err| Error::ProxyFailed {
                program: spec.program.clone(),
                message: match err.kind() {
                    io::ErrorKind::NotFound => "not found in PATH".to_string(),
                    _ => err.to_string(),
                },
            })?;
        let mut proxy = Self {
            program: spec.program.clone(),
            child,
        };
        proxy.wait_until_ready(spec.port, PROXY_READY_TIMEOUT)?;
        Ok(proxy)
    }

    fn wait_until_ready(&mut self, port: u16, timeout: Duration) -> Result<()> {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let deadline = Instant::now() + timeout;
        loop {
            if TcpStream::connect_timeout(&address, POLL_INTERVAL).is_ok() {
                return Ok(());
            }
            let exited = self.child.try_wait().map_err(|err| self.failure(err.to_string()))?;
            if let Some(status) = exited {
                return Err(self.failure(format!(
                    "exited with {status} before accepting connections"
                )));
            }
            if Instant::now() >= deadline {
                return Err(self.failure(format!(
                    "port {port} did not accept connections within {}s",
                    timeout.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn failure(&self, message: String) -> Error {
        Error::ProxyFailed {
            program: self.program.clone(),
            message,
        }
    }

    /// SIGTERM, then SIGKILL if the proxy outlives the grace period.
    fn stop(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        let pid = self.child.id() as pid_t;
        let term = unsafe { libc::kill(pid, libc::SIGTERM) };
        if term == 0 {
            let deadline = Instant::now() + PROXY_STOP_TIMEOUT;
            while Instant::now() < deadline {
                if matches!(self.child.try_wait(), Ok(Some(_))) {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        if let Err(err) = self.child.kill() {
            warn!("failed to kill {} (pid {pid}): {err}", self.program);
        }
        let _ = self.child.wait();
    }
}

impl Drop for DatabaseProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Program and arguments for the session: `command` if given, else `$SHELL`.
pub fn session_command(command: &[String]) -> (String, Vec<String>) {
    match command.split_first() {
        Some((program, args)) => (program.clone(), args.to_vec()),
        None => (
            std::env::var("SHELL")
                .ok()
                .filter(|shell| !shell.is_empty())
                .unwrap_or_else(|| FALLBACK_SHELL.to_string()),
            Vec::new(),
        ),
    }
}

/// Run the session with `environment` exported and return its exit code.
///
/// SIGINT is ignored in this process while the session runs so that Ctrl-C reaches
/// only the child.
pub fn run_session(environment: &Environment, command: &[String]) -> Result<i32> {
    let (program, args) = session_command(command);
    debug!("running session {program} {args:?}");
    let mut child = Command::new(&program)
        .args(&args)
        .envs(environment.iter())
        .spawn()
        .map_err(|source| Error::SessionFailed {
            program: program.clone(),
            source,
        })?;

    let previous = unsafe { libc::signal(libc::SIGINT, libc::SIG_IGN) };
    let status = child.wait();
    unsafe { libc::signal(libc::SIGINT, previous) };

    let status = status.map_err(|source| Error::SessionFailed {
        program: program.clone(),
        source,
    })?;
    Ok(exit_code(status))
}

/// Exit code of a finished session, `128 + signal` when it was killed.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::environment::EnvironmentFlags;
    use crate::core::namespace::derive;

    fn environment() -> Environment {
        let resources = derive("kernelci-production", "kcidb", false).unwrap();
        Environment::compile(&resources, &EnvironmentFlags::default(), &Settings::default())
    }

    #[test]
    fn explicit_command_is_split_into_program_and_args() {
        let (program, args) =
            session_command(&["psql".to_string(), "-c".to_string(), "select 1".to_string()]);
        assert_eq!(program, "psql");
        assert_eq!(args, vec!["-c", "select 1"]);
    }

    #[test]
    fn empty_command_falls_back_to_login_shell() {
        temp_env::with_var("SHELL", Some("/bin/zsh"), || {
            assert_eq!(session_command(&[]).0, "/bin/zsh");
        });
        temp_env::with_var("SHELL", None::<&str>, || {
            assert_eq!(session_command(&[]).0, FALLBACK_SHELL);
        });
    }

    #[test]
    fn session_sees_environment_and_propagates_exit_code() {
        let command = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "test \"$KCIDB_PROJECT_ID\" = kernelci-production && exit 7".to_string(),
        ];
        assert_eq!(run_session(&environment(), &command).unwrap(), 7);
    }

    #[test]
    fn missing_program_is_a_session_error() {
        let command = vec!["/nonexistent/kcidb-session".to_string()];
        match run_session(&environment(), &command) {
            Err(Error::SessionFailed { program, .. }) => {
                assert_eq!(program, "/nonexistent/kcidb-session")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_proxy_binary_is_reported() {
        let spec = ProxySpec {
            program: "/nonexistent/cloud-sql-proxy".to_string(),
            connection_name: "p:r:i".to_string(),
            port: 1,
        };
        match DatabaseProxy::start(&spec) {
            Err(Error::ProxyFailed { message, .. }) => assert_eq!(message, "not found in PATH"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("proxy should not start"),
        }
    }
}
