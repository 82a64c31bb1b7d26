//! CLI command for `milenv platforms`

use anyhow::Result;
use std::path::Path;

use crate::cli::commands::Project;
use crate::cli::output::{is_json, print_json};
use crate::core::platform::Platform;

/// Execute the platforms command
pub async fn execute(dir: &Path) -> Result<()> {
    let project = Project::locate(dir)?;
    let supported = project.descriptor.supported_platforms()?;
    let host = Platform::host().ok();

    if is_json() {
        let entries: Vec<_> = supported
            .iter()
            .map(|p| {
                serde_json::json!({
                    "platform": p,
                    "target": p.rust_triple(),
                    "host": Some(*p) == host,
                })
            })
            .collect();
        return print_json(&entries);
    }

    // Plain list, one per line, for scripting
    for platform in supported {
        let marker = if Some(platform) == host { " (host)" } else { "" };
        println!("{platform}\t{}{marker}", platform.rust_triple());
    }
    Ok(())
}
