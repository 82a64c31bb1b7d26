//! CLI implementation for `milenv init` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::core::channel::Channel;
use crate::core::init::{init, InitOptions};

/// Execute the init command
pub async fn execute(
    path: &Path,
    name: Option<String>,
    channel: Option<&str>,
    force: bool,
) -> Result<()> {
    let channel = channel
        .map(str::parse::<Channel>)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --channel: {e}"))?;
    let options = InitOptions {
        name,
        channel,
        force,
    };

    let result = init(path, &options)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;

    if is_json() {
        return print_json(&serde_json::json!({
            "descriptor": result.descriptor_path,
            "name": result.name,
        }));
    }

    print_success(&format!("Initialized milenv project '{}'", result.name));
    print_detail(&format!("Created {}", result.descriptor_path.display()));
    print_detail("Run 'milenv pin' to record the toolchain digest");
    Ok(())
}
