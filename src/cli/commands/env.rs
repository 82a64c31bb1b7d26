//! CLI command for `milenv env`
//!
//! Prints an activation script, e.g. `eval "$(milenv env)"`.

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::{resolve_environment, Project, ResolveArgs};
use crate::cli::output::{is_json, print_json};
use crate::core::environment::ShellKind;
use crate::infra::shell::{login_shell, process_env};

/// Execute the env command
pub async fn execute(
    dir: &Path,
    args: &ResolveArgs,
    shell: Option<&str>,
    pure: bool,
) -> Result<()> {
    let kind = match shell {
        Some(name) => name.parse::<ShellKind>()?,
        None => ShellKind::from_shell_path(&login_shell()).unwrap_or(ShellKind::Bash),
    };

    let project = Project::locate(dir)?;
    let (_, environment) = resolve_environment(&project, args).await?;

    if is_json() {
        return print_json(&process_env(&environment, pure));
    }

    let inherited = if pure {
        None
    } else {
        std::env::var("PATH").ok()
    };
    // The script is the command's output, so --quiet does not apply
    print!("{}", environment.render(kind, inherited.as_deref()));
    Ok(())
}
