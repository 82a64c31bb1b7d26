//! CLI command for `milenv shell`

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::{resolve_environment, Project, ResolveArgs};
use crate::cli::output::{print_info, print_success};
use crate::infra::shell::run;

/// Execute the shell command, returning the exit code of the child
pub async fn execute(
    dir: &Path,
    args: &ResolveArgs,
    pure: bool,
    command: &[String],
) -> Result<i32> {
    let project = Project::locate(dir)?;
    let (_, environment) = resolve_environment(&project, args).await?;

    if command.is_empty() {
        print_success(&format!(
            "Entering milenv shell for '{}' ({})",
            environment.project, environment.platform
        ));
    }

    let status = run(&environment, command, pure, dir).await?;

    if command.is_empty() {
        print_info("Left milenv shell");
    }
    Ok(status.code().unwrap_or(1))
}
