//! CLI command for `milenv pin`

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::Project;
use crate::cli::output::{create_spinner, is_json, print_detail, print_json, print_success};
use crate::core::channel::Channel;
use crate::core::pin::pin;

/// Execute the pin command
pub async fn execute(dir: &Path, channel: Option<&str>) -> Result<()> {
    let channel = channel
        .map(str::parse::<Channel>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --channel: {e}"))?;
    let project = Project::locate(dir)?;
    let resolver = project.resolver()?;

    let spinner = create_spinner("Fetching channel manifest...");
    let result = pin(&project.descriptor_path, channel, resolver.dist()).await;
    spinner.finish_and_clear();
    let result = result.context("Failed to pin toolchain")?;

    if is_json() {
        return print_json(&serde_json::json!({
            "channel": result.channel,
            "digest": result.digest,
            "previous": result.previous,
            "version": result.version,
            "changed": result.changed(),
        }));
    }

    if result.changed() {
        print_success(&format!("Pinned '{}' to {}", result.channel, result.digest));
    } else {
        print_success(&format!("'{}' is already pinned to {}", result.channel, result.digest));
    }
    if let Some(version) = &result.version {
        print_detail(&format!("rustc {version}"));
    }
    Ok(())
}
