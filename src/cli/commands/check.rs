//! Check command implementation
//!
//! Implements `milenv check` to validate the descriptor offline.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_detail, print_info, print_json, print_success, print_warning, status};
use crate::config::defaults::DESCRIPTOR_FILE;
use crate::core::check;
use crate::core::descriptor::Descriptor;
use crate::error::DescriptorError;

/// Execute the check command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let descriptor_path =
        Descriptor::find(project_dir).ok_or_else(|| DescriptorError::NotFound {
            path: project_dir.join(DESCRIPTOR_FILE),
        })?;
    let content = std::fs::read_to_string(&descriptor_path)
        .with_context(|| format!("Failed to read {}", descriptor_path.display()))?;
    // Parse without validating so every problem is reported at once
    let descriptor = Descriptor::from_toml(&content)?;
    let root = descriptor_path.parent().unwrap_or(project_dir);

    tracing::info!("Checking project: {}", descriptor.project.name);
    let result = check::check(root, &descriptor);

    if is_json() {
        print_json(&serde_json::json!({
            "valid": result.is_valid(),
            "problems": result.problems,
            "warnings": result.warnings,
            "platforms": result.platforms,
            "dependencies": result.dependencies,
            "host_supported": result.host_supported,
        }))?;
    } else {
        print_info(&format!("Checking {}", descriptor_path.display()));
        for problem in &result.problems {
            eprintln!("{} {problem}", status::ERROR);
        }
        for warning in &result.warnings {
            print_warning(warning);
        }
        print_detail(&format!(
            "Toolchain: {} ({})",
            descriptor.toolchain.channel,
            descriptor.toolchain.components.join(", ")
        ));
        print_detail(&format!(
            "Index: {} {}",
            descriptor.index.name, descriptor.index.revision
        ));
        print_detail(&format!("Packages: {}", result.dependencies.join(", ")));
    }

    if !result.is_valid() {
        bail!(
            "Check failed with {} problem(s) in {}",
            result.problems.len(),
            descriptor_path.display()
        );
    }
    print_success("Check passed");
    Ok(())
}
