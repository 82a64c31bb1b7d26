//! CLI command for `milenv lock`
//!
//! Records the metadata of a resolution for each platform. Artifacts are
//! not downloaded.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::Project;
use crate::cli::output::{create_spinner, is_json, print_detail, print_json, print_success};
use crate::core::lock::LockFile;

/// Execute the lock command
pub async fn execute(dir: &Path, platforms: &[String]) -> Result<()> {
    let project = Project::locate(dir)?;
    let resolver = project.resolver()?;
    let platforms: Vec<String> = if platforms.is_empty() {
        project
            .descriptor
            .supported_platforms()?
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        platforms.to_vec()
    };

    let lock_path = project.lock_path();
    let mut lock = LockFile::load_or_default(&lock_path)?;

    for platform in &platforms {
        let spinner = create_spinner(&format!("Locking {platform}..."));
        let plan = resolver.plan(platform).await;
        spinner.finish_and_clear();
        let plan = plan.with_context(|| format!("Failed to lock {platform}"))?;
        lock.record(&plan);
        print_detail(&format!("{platform}: {}", plan.fingerprint().short()));
    }

    lock.save(&lock_path)?;

    if is_json() {
        return print_json(&lock);
    }
    print_success(&format!(
        "Locked {} platform(s) in {}",
        platforms.len(),
        lock_path.display()
    ));
    Ok(())
}
