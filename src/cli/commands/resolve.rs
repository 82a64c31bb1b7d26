//! CLI command for `milenv resolve`

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::commands::{resolve_environment, Project, ResolveArgs};
use crate::cli::output::{is_json, print_detail, print_info, print_json, print_success};
use crate::core::environment::Environment;

/// Machine-readable resolution report
#[derive(Serialize)]
struct ResolveReport<'a> {
    fingerprint: String,
    search_path: Vec<PathBuf>,
    variables: BTreeMap<String, String>,
    #[serde(flatten)]
    environment: &'a Environment,
}

/// Execute the resolve command
pub async fn execute(dir: &Path, args: &ResolveArgs) -> Result<()> {
    let project = Project::locate(dir)?;
    let (plan, environment) = resolve_environment(&project, args).await?;

    if is_json() {
        return print_json(&ResolveReport {
            fingerprint: environment.fingerprint().to_string(),
            search_path: environment.search_path(),
            variables: environment.variables(None),
            environment: &environment,
        });
    }

    print_success(&format!(
        "Resolved '{}' for {}",
        environment.project, environment.platform
    ));
    print_info(&format!(
        "Toolchain {} ({}), manifest {}",
        environment.toolchain.channel,
        environment.toolchain.version,
        plan.manifest_digest.short()
    ));
    for component in &environment.toolchain.components {
        print_detail(&format!("{} {}", component.name, component.sha256.short()));
    }
    print_info(&format!("Index revision {}", plan.index_revision));
    for package in environment.packages.values() {
        print_detail(&format!(
            "{} {} {}",
            package.name,
            package.version,
            package.sha256.short()
        ));
    }
    print_info("Search path");
    for dir in environment.search_path() {
        print_detail(&dir.display().to_string());
    }
    print_info(&format!("Fingerprint {}", environment.fingerprint()));
    Ok(())
}
