//! Check command logic
//!
//! Validates the descriptor without touching the network and reports
//! what a resolution would request.

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::defaults::LOCK_FILE;
use crate::core::descriptor::Descriptor;
use crate::core::lock::LockFile;
use crate::core::platform::Platform;

/// Result of the check operation
#[derive(Debug, Default)]
pub struct CheckResult {
    /// Validation problems, each fatal to resolution
    pub problems: Vec<String>,
    /// Things that resolve but weaken reproducibility
    pub warnings: Vec<String>,
    /// Supported platforms
    pub platforms: Vec<Platform>,
    /// Dependencies that would be requested
    pub dependencies: Vec<String>,
    /// Whether the host can resolve the descriptor
    pub host_supported: bool,
}

impl CheckResult {
    /// Check if all validations passed
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check a descriptor that lives in `project_dir`
pub fn check(project_dir: &Path, descriptor: &Descriptor) -> CheckResult {
    let mut result = CheckResult {
        problems: descriptor.problems().iter().map(ToString::to_string).collect(),
        platforms: descriptor.supported_platforms().unwrap_or_default(),
        dependencies: descriptor.dependencies().into_iter().collect(),
        ..CheckResult::default()
    };

    if descriptor.toolchain.digest.is_none() {
        result.problems.push(format!(
            "Toolchain channel '{}' has no digest; run 'milenv pin'",
            descriptor.toolchain.channel
        ));
    } else if descriptor.toolchain.channel.is_floating() {
        result.warnings.push(format!(
            "Channel '{}' floats; resolution fails once it moves until 'milenv pin' is run again",
            descriptor.toolchain.channel
        ));
    }

    if descriptor.index.digest.is_none() {
        result.warnings.push(format!(
            "Index revision '{}' has no digest; its contents are trusted as served",
            descriptor.index.revision
        ));
    }

    let mut seen = BTreeSet::new();
    for name in &descriptor.shell.packages {
        if !seen.insert(name) {
            result
                .warnings
                .push(format!("Package '{name}' is listed more than once"));
        }
    }

    match Platform::host() {
        Ok(host) => {
            result.host_supported = result.platforms.contains(&host);
            if !result.host_supported {
                result.warnings.push(format!(
                    "Host platform '{host}' is not in the supported list"
                ));
            }
        }
        Err(raw) => {
            result
                .warnings
                .push(format!("Host platform '{raw}' cannot be resolved by milenv"));
        }
    }

    let lock_path = project_dir.join(LOCK_FILE);
    match LockFile::load(&lock_path) {
        Ok(lock) => {
            for platform in &result.platforms {
                if lock.get(platform.as_str()).is_none() {
                    result
                        .warnings
                        .push(format!("Lock file has no entry for '{platform}'"));
                }
            }
        }
        Err(crate::error::LockError::NotFound { .. }) => {}
        Err(e) => result.problems.push(e.to_string()),
    }

    result
}
