//! Shell and command spawning
//!
//! Runs an interactive shell or a single command inside a resolved
//! environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::process::Command;

use crate::core::environment::Environment;
use crate::error::ShellError;

/// Variables a pure shell keeps from the caller
pub const PASSTHROUGH_VARS: &[&str] = &["HOME", "USER", "LOGNAME", "TERM", "LANG", "SHELL", "TMPDIR"];

const FALLBACK_SHELL: &str = "/bin/sh";

/// The caller's login shell
pub fn login_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

/// Variables a spawned process receives
///
/// Impure shells keep the caller's `PATH` after the environment's own
/// entries; pure shells see only the declared tools.
pub fn process_env(environment: &Environment, pure: bool) -> BTreeMap<String, String> {
    let inherited = if pure {
        None
    } else {
        std::env::var("PATH").ok()
    };
    environment.variables(inherited.as_deref())
}

/// Find `program` on the `PATH` of the spawned process
pub fn locate(program: &str, path: &str, cwd: &Path) -> Result<PathBuf, ShellError> {
    which::which_in(program, Some(path), cwd).map_err(|e| ShellError::Spawn {
        program: program.to_string(),
        error: e.to_string(),
    })
}

/// Run `command` (or the login shell) inside the environment
pub async fn run(
    environment: &Environment,
    command: &[String],
    pure: bool,
    cwd: &Path,
) -> Result<ExitStatus, ShellError> {
    let vars = process_env(environment, pure);

    let mut cmd = match command.split_first() {
        Some((program, args)) => {
            let path = vars.get("PATH").map_or("", String::as_str);
            let resolved = locate(program, path, cwd)?;
            tracing::debug!("Running {}", resolved.display());
            let mut cmd = Command::new(resolved);
            cmd.args(args);
            cmd
        }
        None => {
            let shell = login_shell();
            tracing::debug!("Starting shell {shell}");
            Command::new(shell)
        }
    };

    if pure {
        cmd.env_clear();
        for name in PASSTHROUGH_VARS {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }
    }
    cmd.envs(&vars).current_dir(cwd);

    let program = cmd.as_std().get_program().to_string_lossy().to_string();
    cmd.status().await.map_err(|e| ShellError::Spawn {
        program,
        error: e.to_string(),
    })
}
