//! Lock file handling
//!
//! The lock file (milenv.lock) records, per platform, the exact toolchain,
//! index document and package artifacts a resolution used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::defaults::LOCK_FORMAT_VERSION;
use crate::core::digest::Sha256Digest;
use crate::core::resolver::ResolutionPlan;
use crate::error::LockError;

/// Lock file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockFile {
    /// Lock file format version
    pub version: u32,

    /// Locked resolutions keyed by platform identifier
    #[serde(default)]
    pub platforms: BTreeMap<String, LockedPlatform>,
}

/// Resolution recorded for one platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedPlatform {
    /// Environment fingerprint
    pub fingerprint: Sha256Digest,

    pub toolchain: LockedToolchain,

    pub index: LockedIndex,

    /// Locked packages keyed by name
    #[serde(default)]
    pub packages: BTreeMap<String, LockedArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedToolchain {
    pub channel: String,
    pub version: String,
    /// Digest of the channel manifest
    pub manifest: Sha256Digest,
    pub components: BTreeMap<String, LockedArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedIndex {
    pub revision: String,
    /// Digest of the index document
    pub digest: Sha256Digest,
}

/// A locked artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedArtifact {
    /// Exact version
    pub version: String,

    /// SHA256 checksum of the artifact
    pub sha256: Sha256Digest,
}

impl LockedPlatform {
    /// Record a plan
    pub fn from_plan(plan: &ResolutionPlan) -> Self {
        Self {
            fingerprint: plan.fingerprint(),
            toolchain: LockedToolchain {
                channel: plan.channel.clone(),
                version: plan.toolchain_version.clone(),
                manifest: plan.manifest_digest.clone(),
                components: plan
                    .components
                    .iter()
                    .map(|c| {
                        (
                            c.name.clone(),
                            LockedArtifact {
                                version: c.version.clone(),
                                sha256: c.hash.clone(),
                            },
                        )
                    })
                    .collect(),
            },
            index: LockedIndex {
                revision: plan.index_revision.clone(),
                digest: plan.index_digest.clone(),
            },
            packages: plan
                .packages
                .iter()
                .map(|(name, entry)| {
                    (
                        name.clone(),
                        LockedArtifact {
                            version: entry.version.clone(),
                            sha256: entry.sha256.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// First difference between this record and `other`
    fn difference(&self, other: &Self) -> Option<String> {
        if self.toolchain.channel != other.toolchain.channel {
            return Some(format!(
                "toolchain channel '{}' is locked as '{}'",
                other.toolchain.channel, self.toolchain.channel
            ));
        }
        if self.toolchain.manifest != other.toolchain.manifest {
            return Some(format!(
                "channel manifest is {}, locked {}",
                other.toolchain.manifest, self.toolchain.manifest
            ));
        }
        if self.toolchain.components != other.toolchain.components {
            return Some("toolchain components changed".to_string());
        }
        if self.index != other.index {
            return Some(format!(
                "index document for revision '{}' is {}, locked {} for revision '{}'",
                other.index.revision, other.index.digest, self.index.digest, self.index.revision
            ));
        }
        for (name, locked) in &self.packages {
            match other.packages.get(name) {
                None => return Some(format!("package '{name}' is no longer declared")),
                Some(fresh) if fresh != locked => {
                    return Some(format!(
                        "package '{name}' resolved to {} ({}), locked {} ({})",
                        fresh.version, fresh.sha256, locked.version, locked.sha256
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(name) = other.packages.keys().find(|n| !self.packages.contains_key(*n)) {
            return Some(format!("package '{name}' is not in the lock file"));
        }
        (self.fingerprint != other.fingerprint)
            .then(|| "environment variables changed".to_string())
    }
}

impl LockFile {
    /// Create an empty lock file
    pub fn new() -> Self {
        Self {
            version: LOCK_FORMAT_VERSION,
            platforms: BTreeMap::new(),
        }
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, LockError> {
        if !path.exists() {
            return Err(LockError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let parse_err = |error: String| LockError::Parse {
            path: path.to_path_buf(),
            error,
        };
        let content = std::fs::read_to_string(path).map_err(|e| parse_err(e.to_string()))?;
        let lock = Self::from_toml(&content).map_err(|e| parse_err(e.to_string()))?;
        if lock.version != LOCK_FORMAT_VERSION {
            return Err(parse_err(format!(
                "unsupported lock format version {}",
                lock.version
            )));
        }
        Ok(lock)
    }

    /// Load from a file, or start empty when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, LockError> {
        match Self::load(path) {
            Err(LockError::NotFound { .. }) => Ok(Self::new()),
            other => other,
        }
    }

    /// Write to a file
    pub fn save(&self, path: &Path) -> Result<(), LockError> {
        let write_err = |error: String| LockError::Write {
            path: path.to_path_buf(),
            error,
        };
        let content = self.to_toml().map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))
    }

    /// Record a plan, replacing any previous entry for its platform
    pub fn record(&mut self, plan: &ResolutionPlan) {
        self.platforms
            .insert(plan.platform.to_string(), LockedPlatform::from_plan(plan));
    }

    /// Get the locked entry for a platform
    pub fn get(&self, platform: &str) -> Option<&LockedPlatform> {
        self.platforms.get(platform)
    }

    /// Check that a fresh plan matches what was locked
    pub fn verify(&self, plan: &ResolutionPlan) -> Result<(), LockError> {
        let platform = plan.platform.to_string();
        let locked = self
            .get(&platform)
            .ok_or_else(|| LockError::MissingPlatform {
                platform: platform.clone(),
            })?;
        match locked.difference(&LockedPlatform::from_plan(plan)) {
            Some(detail) => Err(LockError::Mismatch { platform, detail }),
            None => Ok(()),
        }
    }
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Platform;
    use crate::infra::dist::ComponentArtifact;
    use crate::infra::index::IndexEntry;
    use tempfile::TempDir;

    fn plan() -> ResolutionPlan {
        ResolutionPlan {
            project: "mil".to_string(),
            platform: Platform::Aarch64Darwin,
            channel: "stable".to_string(),
            toolchain_version: "1.63.0".to_string(),
            manifest_digest: Sha256Digest::of(b"manifest"),
            components: vec![ComponentArtifact {
                name: "rustc".to_string(),
                version: "1.63.0 (4b91a6ea7 2022-08-08)".to_string(),
                url: "https://dist.example/rustc.tar.gz".to_string(),
                hash: Sha256Digest::of(b"rustc"),
            }],
            index_revision: "nixos-22.05".to_string(),
            index_digest: Sha256Digest::of(b"index"),
            packages: BTreeMap::from([(
                "openssl".to_string(),
                IndexEntry {
                    version: "3.0.5".to_string(),
                    url: "https://idx.example/openssl.tar.gz".to_string(),
                    sha256: Sha256Digest::of(b"openssl"),
                    bin: vec!["bin".to_string()],
                    include: vec!["include".to_string()],
                    lib: vec!["lib".to_string()],
                },
            )]),
            vars: BTreeMap::new(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("milenv.lock");
        let mut lock = LockFile::new();
        lock.record(&plan());
        lock.save(&path).unwrap();

        let loaded = LockFile::load(&path).unwrap();
        assert_eq!(loaded, lock);
        let entry = loaded.get("aarch64-darwin").unwrap();
        assert_eq!(entry.packages["openssl"].version, "3.0.5");
        assert_eq!(entry.toolchain.components["rustc"].sha256, Sha256Digest::of(b"rustc"));
    }

    #[test]
    fn test_load_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("milenv.lock");
        assert!(matches!(LockFile::load(&path), Err(LockError::NotFound { .. })));
        assert!(LockFile::load_or_default(&path).unwrap().platforms.is_empty());
    }

    #[test]
    fn test_load_rejects_other_format_versions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("milenv.lock");
        std::fs::write(&path, "version = 7\n").unwrap();
        assert!(matches!(LockFile::load(&path), Err(LockError::Parse { .. })));
    }

    #[test]
    fn test_verify_matching_plan() {
        let mut lock = LockFile::new();
        lock.record(&plan());
        assert!(lock.verify(&plan()).is_ok());
    }

    #[test]
    fn test_verify_missing_platform() {
        let lock = LockFile::new();
        assert!(matches!(
            lock.verify(&plan()),
            Err(LockError::MissingPlatform { .. })
        ));
    }

    #[test]
    fn test_verify_detects_manifest_drift() {
        let mut lock = LockFile::new();
        lock.record(&plan());
        let mut fresh = plan();
        fresh.manifest_digest = Sha256Digest::of(b"republished");
        match lock.verify(&fresh).unwrap_err() {
            LockError::Mismatch { platform, detail } => {
                assert_eq!(platform, "aarch64-darwin");
                assert!(detail.contains("channel manifest"), "{detail}");
            }
            other => panic!("Expected Mismatch, got: {other:?}"),
        }
    }

    #[test]
    fn test_verify_detects_package_changes() {
        let mut lock = LockFile::new();
        lock.record(&plan());

        let mut fresh = plan();
        fresh.packages.get_mut("openssl").unwrap().version = "3.0.7".to_string();
        let err = lock.verify(&fresh).unwrap_err();
        assert!(err.to_string().contains("openssl"));

        let mut fresh = plan();
        let extra = fresh.packages["openssl"].clone();
        fresh.packages.insert("mold".to_string(), extra);
        let err = lock.verify(&fresh).unwrap_err();
        assert!(err.to_string().contains("'mold' is not in the lock file"));
    }

    #[test]
    fn test_verify_detects_variable_changes() {
        let mut lock = LockFile::new();
        lock.record(&plan());
        let mut fresh = plan();
        fresh.vars.insert("RUSTFLAGS".to_string(), "-Copt-level=3".to_string());
        assert!(lock.verify(&fresh).is_err());
    }
}
