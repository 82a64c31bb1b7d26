//! Resolved shell environments
//!
//! An [`Environment`] is the value produced by resolving a descriptor: the
//! merged toolchain, one store entry per declared dependency, and the
//! variables an activated shell receives.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::digest::Sha256Digest;
use crate::core::platform::Platform;
use crate::error::ShellError;

/// Search path separator on every supported platform
const PATH_SEPARATOR: &str = ":";

/// One toolchain component as published by the distribution channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedComponent {
    pub name: String,
    pub version: String,
    pub sha256: Sha256Digest,
}

/// The merged compiler toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedToolchain {
    pub channel: String,
    pub version: String,
    pub manifest_digest: Sha256Digest,
    pub components: Vec<ResolvedComponent>,
    pub root: PathBuf,
}

impl ResolvedToolchain {
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }
}

/// One declared dependency, unpacked in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub sha256: Sha256Digest,
    pub root: PathBuf,
    pub bin: Vec<PathBuf>,
    pub include: Vec<PathBuf>,
    pub lib: Vec<PathBuf>,
}

/// A resolved shell environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub project: String,
    pub platform: Platform,
    pub toolchain: ResolvedToolchain,
    /// Declared dependencies keyed by name
    pub packages: BTreeMap<String, ResolvedPackage>,
    /// Extra variables from the descriptor
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    /// Directories exposed on the search path, toolchain first
    ///
    /// Contains the toolchain and the declared dependencies, nothing else.
    pub fn search_path(&self) -> Vec<PathBuf> {
        std::iter::once(self.toolchain.bin_dir())
            .chain(self.packages.values().flat_map(|p| p.bin.iter().cloned()))
            .collect()
    }

    fn include_path(&self) -> Vec<PathBuf> {
        self.packages
            .values()
            .flat_map(|p| p.include.iter().cloned())
            .collect()
    }

    fn library_path(&self) -> Vec<PathBuf> {
        self.packages
            .values()
            .flat_map(|p| p.lib.iter().cloned())
            .collect()
    }

    fn pkg_config_path(&self) -> Vec<PathBuf> {
        self.library_path()
            .into_iter()
            .map(|dir| dir.join("pkgconfig"))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    /// Digest identifying the resolution
    ///
    /// Covers what was resolved, not where the store lives, so two
    /// evaluations of the same descriptor agree even with separate stores.
    pub fn fingerprint(&self) -> Sha256Digest {
        fingerprint(
            self.platform,
            &self.toolchain.channel,
            &self.toolchain.version,
            &self.toolchain.manifest_digest,
            &self.toolchain.components,
            self.packages
                .values()
                .map(|p| (p.name.as_str(), p.version.as_str(), &p.sha256)),
            &self.vars,
        )
    }

    /// Variables of the activated shell
    ///
    /// `inherited_path` is appended to `PATH`; pass `None` for a pure shell
    /// that sees only the declared tools.
    pub fn variables(&self, inherited_path: Option<&str>) -> BTreeMap<String, String> {
        let mut vars = self.vars.clone();

        let mut path = join(&self.search_path());
        if let Some(inherited) = inherited_path.filter(|p| !p.is_empty()) {
            path.push_str(PATH_SEPARATOR);
            path.push_str(inherited);
        }
        vars.insert("PATH".to_string(), path);

        let include = self.include_path();
        if !include.is_empty() {
            vars.insert("C_INCLUDE_PATH".to_string(), join(&include));
        }
        let mut libs = vec![self.toolchain.lib_dir()];
        libs.extend(self.library_path());
        vars.insert("LIBRARY_PATH".to_string(), join(&libs));
        let pkg_config = self.pkg_config_path();
        if !pkg_config.is_empty() {
            vars.insert("PKG_CONFIG_PATH".to_string(), join(&pkg_config));
        }

        vars.insert("MILENV_PROJECT".to_string(), self.project.clone());
        vars.insert("MILENV_PLATFORM".to_string(), self.platform.to_string());
        vars.insert("MILENV_TOOLCHAIN".to_string(), self.toolchain.channel.clone());
        vars.insert(
            "MILENV_FINGERPRINT".to_string(),
            self.fingerprint().hex().to_string(),
        );
        vars
    }

    /// Activation script for `shell`
    pub fn render(&self, shell: ShellKind, inherited_path: Option<&str>) -> String {
        let mut script = String::new();
        for (key, value) in self.variables(inherited_path) {
            let line = match shell {
                ShellKind::Bash | ShellKind::Zsh => format!("export {key}={}", quote_sh(&value)),
                ShellKind::Fish => format!("set -gx {key} {}", quote_fish(&value)),
            };
            script.push_str(&line);
            script.push('\n');
        }
        script
    }
}

/// Fingerprint over the canonical rendering of a resolution
///
/// Shared by resolution plans and environments so a lock file recorded
/// from a plan matches the environment realized from it.
pub(crate) fn fingerprint<'a>(
    platform: Platform,
    channel: &str,
    version: &str,
    manifest_digest: &Sha256Digest,
    components: &[ResolvedComponent],
    packages: impl Iterator<Item = (&'a str, &'a str, &'a Sha256Digest)>,
    vars: &BTreeMap<String, String>,
) -> Sha256Digest {
    let mut canonical = String::new();
    let _ = writeln!(canonical, "platform {platform}");
    let _ = writeln!(canonical, "toolchain {channel} {version} {manifest_digest}");
    for component in components {
        let _ = writeln!(
            canonical,
            "component {} {} {}",
            component.name, component.version, component.sha256
        );
    }
    for (name, version, sha256) in packages {
        let _ = writeln!(canonical, "package {name} {version} {sha256}");
    }
    for (key, value) in vars {
        let _ = writeln!(canonical, "var {key}={value}");
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Sha256Digest::from_hasher(hasher)
}

fn join(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

fn quote_sh(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_fish(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

/// Shell dialect for activation scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
}

impl ShellKind {
    /// Guess the dialect from a shell path such as `$SHELL`
    pub fn from_shell_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        name.parse().ok()
    }
}

impl FromStr for ShellKind {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" | "sh" => Ok(ShellKind::Bash),
            "zsh" => Ok(ShellKind::Zsh),
            "fish" => Ok(ShellKind::Fish),
            other => Err(ShellError::UnsupportedShell {
                name: other.to_string(),
            }),
        }
    }
}
