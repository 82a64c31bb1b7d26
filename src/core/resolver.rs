//! Descriptor resolution
//!
//! Resolution runs in two steps. [`Resolver::plan`] works on metadata only:
//! it checks the platform, verifies the channel manifest against the pinned
//! digest and looks every dependency up in the package index.
//! [`Resolver::realize`] then fetches the planned artifacts into the store
//! and composes the [`Environment`]. Any failure aborts the whole
//! resolution; there is no partial environment and no retry.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::channel::ToolchainPin;
use crate::core::descriptor::Descriptor;
use crate::core::digest::Sha256Digest;
use crate::core::environment::{
    self, Environment, ResolvedComponent, ResolvedPackage, ResolvedToolchain,
};
use crate::core::global_config::GlobalConfig;
use crate::core::platform::Platform;
use crate::error::{DownloadError, ResolveError, StoreError};
use crate::infra::dirs::MilenvDirs;
use crate::infra::dist::{ComponentArtifact, DistClient};
use crate::infra::download::{DownloadManager, DownloadRequest};
use crate::infra::index::{IndexClient, IndexEntry};
use crate::infra::store::Store;

/// Store entry name of merged toolchains
pub const TOOLCHAIN_ENTRY: &str = "rust";

/// Everything needed to realize an environment, fetched and verified
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionPlan {
    pub project: String,
    pub platform: Platform,
    pub channel: String,
    pub toolchain_version: String,
    pub manifest_digest: Sha256Digest,
    #[serde(skip)]
    pub components: Vec<ComponentArtifact>,
    pub index_revision: String,
    pub index_digest: Sha256Digest,
    pub packages: BTreeMap<String, IndexEntry>,
    pub vars: BTreeMap<String, String>,
}

impl ResolutionPlan {
    pub fn resolved_components(&self) -> Vec<ResolvedComponent> {
        self.components
            .iter()
            .map(|c| ResolvedComponent {
                name: c.name.clone(),
                version: c.version.clone(),
                sha256: c.hash.clone(),
            })
            .collect()
    }

    /// Store key of the merged toolchain
    ///
    /// Derived from the component hashes, so the same components always
    /// merge into the same entry.
    pub fn toolchain_key(&self) -> Sha256Digest {
        let mut hasher = Sha256::new();
        for component in &self.components {
            hasher.update(component.name.as_bytes());
            hasher.update(b" ");
            hasher.update(component.hash.hex().as_bytes());
            hasher.update(b"\n");
        }
        Sha256Digest::from_hasher(hasher)
    }

    /// Fingerprint of the environment this plan realizes into
    pub fn fingerprint(&self) -> Sha256Digest {
        environment::fingerprint(
            self.platform,
            &self.channel,
            &self.toolchain_version,
            &self.manifest_digest,
            &self.resolved_components(),
            self.packages
                .iter()
                .map(|(name, entry)| (name.as_str(), entry.version.as_str(), &entry.sha256)),
            &self.vars,
        )
    }

    fn environment(
        &self,
        toolchain_root: PathBuf,
        package_roots: &BTreeMap<String, PathBuf>,
    ) -> Environment {
        let packages = self
            .packages
            .iter()
            .filter_map(|(name, entry)| {
                let root = package_roots.get(name)?;
                let under = |dirs: &[String]| dirs.iter().map(|d| root.join(d)).collect();
                Some((
                    name.clone(),
                    ResolvedPackage {
                        name: name.clone(),
                        version: entry.version.clone(),
                        sha256: entry.sha256.clone(),
                        bin: under(&entry.bin),
                        include: under(&entry.include),
                        lib: under(&entry.lib),
                        root: root.clone(),
                    },
                ))
            })
            .collect();

        Environment {
            project: self.project.clone(),
            platform: self.platform,
            toolchain: ResolvedToolchain {
                channel: self.channel.clone(),
                version: self.toolchain_version.clone(),
                manifest_digest: self.manifest_digest.clone(),
                components: self.resolved_components(),
                root: toolchain_root,
            },
            packages,
            vars: self.vars.clone(),
        }
    }
}

/// Resolves a descriptor into environments
#[derive(Debug, Clone)]
pub struct Resolver {
    descriptor: Descriptor,
    dist: DistClient,
    index: IndexClient,
    downloads: DownloadManager,
    store: Store,
    downloads_dir: PathBuf,
    parallel: usize,
}

impl Resolver {
    /// Create a resolver using the user's directories and configuration
    pub fn new(descriptor: Descriptor, config: &GlobalConfig, dirs: &MilenvDirs) -> Self {
        let downloads = DownloadManager::new();
        let dist = DistClient::new(
            downloads.clone(),
            config.dist_url(descriptor.toolchain.dist_url.as_deref()),
        );
        let index = IndexClient::new(
            downloads.clone(),
            config.index_url(descriptor.index.url.as_deref()),
        );
        Self {
            descriptor,
            dist,
            index,
            downloads,
            store: Store::new(dirs.store_dir()),
            downloads_dir: dirs.downloads_dir(),
            parallel: config.parallel_downloads(),
        }
    }

    /// Substitute the pinned toolchain release
    pub fn with_toolchain(mut self, pin: ToolchainPin) -> Self {
        tracing::info!("Overriding toolchain with {pin}");
        self.descriptor = self.descriptor.override_toolchain(pin);
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn dist(&self) -> &DistClient {
        &self.dist
    }

    /// Resolve the descriptor for `platform`
    pub async fn resolve(&self, platform: &str) -> Result<Environment, ResolveError> {
        let plan = self.plan(platform).await?;
        self.realize(&plan).await
    }

    /// Resolve metadata for `platform` without fetching artifacts
    pub async fn plan(&self, platform: &str) -> Result<ResolutionPlan, ResolveError> {
        let supported = self.descriptor.supported_platforms()?;
        let platform = Platform::parse_supported(platform, &supported)?;
        tracing::info!(
            "Resolving '{}' for {platform}",
            self.descriptor.project.name
        );

        let pin = self.descriptor.pin();
        let verified = self.dist.fetch_manifest(&pin).await?;
        let channel = pin.channel.to_string();
        let components = verified.manifest.select(
            &channel,
            &self.descriptor.toolchain.components,
            platform,
        )?;
        let toolchain_version = verified
            .manifest
            .rustc_version()
            .map_or_else(|| channel.clone(), ToString::to_string);
        tracing::debug!(
            "Selected {} toolchain components for {}",
            components.len(),
            platform.rust_triple()
        );

        let index = &self.descriptor.index;
        let fetched = self
            .index
            .fetch(&index.revision, platform, index.digest.as_ref())
            .await?;
        let packages = fetched.index.lookup(&self.descriptor.dependencies())?;
        for (name, entry) in &packages {
            tracing::debug!("Package '{name}' resolved to {}", entry.version);
        }

        Ok(ResolutionPlan {
            project: self.descriptor.project.name.clone(),
            platform,
            channel,
            toolchain_version,
            manifest_digest: verified.digest,
            components,
            index_revision: index.revision.clone(),
            index_digest: fetched.digest,
            packages,
            vars: self.descriptor.shell.env.clone(),
        })
    }

    /// Fetch the planned artifacts into the store and compose the environment
    ///
    /// Entries already in the store are reused without network access.
    pub async fn realize(&self, plan: &ResolutionPlan) -> Result<Environment, ResolveError> {
        let toolchain_key = plan.toolchain_key();
        let cached_toolchain =
            self.store
                .lookup(&toolchain_key, TOOLCHAIN_ENTRY, &plan.toolchain_version);

        let mut package_roots = BTreeMap::new();
        let mut missing = Vec::new();
        for (name, entry) in &plan.packages {
            match self.store.lookup(&entry.sha256, name, &entry.version) {
                Some(path) => {
                    tracing::debug!("Package '{name}' found in store");
                    package_roots.insert(name.clone(), path);
                }
                None => missing.push((name, entry)),
            }
        }

        let mut artifacts: Vec<(&str, &str, &Sha256Digest)> = Vec::new();
        if cached_toolchain.is_none() {
            artifacts.extend(
                plan.components
                    .iter()
                    .map(|c| (c.name.as_str(), c.url.as_str(), &c.hash)),
            );
        }
        artifacts.extend(
            missing
                .iter()
                .map(|(name, entry)| (name.as_str(), entry.url.as_str(), &entry.sha256)),
        );

        let scratch = self.scratch_dir()?;
        let archives = self.fetch_artifacts(scratch.path(), &artifacts).await?;
        let (component_archives, package_archives) =
            archives.split_at(if cached_toolchain.is_none() { plan.components.len() } else { 0 });

        let toolchain_root = match cached_toolchain {
            Some(path) => {
                tracing::debug!("Toolchain {} found in store", plan.toolchain_version);
                path
            }
            None => {
                self.store
                    .install_toolchain(component_archives, &toolchain_key, &plan.toolchain_version)?
            }
        };

        for ((name, entry), archive) in missing.iter().zip(package_archives) {
            let root = self
                .store
                .install_package(archive, &entry.sha256, name, &entry.version)?;
            tracing::info!("Installed {name} {}", entry.version);
            package_roots.insert((*name).clone(), root);
        }

        let environment = plan.environment(toolchain_root, &package_roots);
        tracing::info!(
            "Environment for {} resolved ({})",
            plan.platform,
            environment.fingerprint().short()
        );
        Ok(environment)
    }

    /// Per-evaluation download directory, removed when dropped
    fn scratch_dir(&self) -> Result<tempfile::TempDir, ResolveError> {
        let create_err = |e: std::io::Error| StoreError::CreateDir {
            path: self.downloads_dir.clone(),
            error: e.to_string(),
        };
        std::fs::create_dir_all(&self.downloads_dir).map_err(create_err)?;
        let dir = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(&self.downloads_dir)
            .map_err(create_err)?;
        Ok(dir)
    }

    /// Download artifacts concurrently, verifying each against its digest
    async fn fetch_artifacts(
        &self,
        dir: &Path,
        artifacts: &[(&str, &str, &Sha256Digest)],
    ) -> Result<Vec<PathBuf>, ResolveError> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!("Fetching {} artifacts", artifacts.len());

        let requests = artifacts
            .iter()
            .map(|(name, url, digest)| DownloadRequest {
                url: (*url).to_string(),
                dest: dir.join(format!("{}-{name}.tar.gz", digest.short())),
                expected: (*digest).clone(),
            })
            .collect();

        self.downloads
            .download_parallel(requests, self.parallel)
            .await
            .into_iter()
            .map(|result| result.map(|r| r.path).map_err(integrity_error))
            .collect()
    }
}

/// A checksum failure on a pinned artifact is an integrity violation
fn integrity_error(error: DownloadError) -> ResolveError {
    match error {
        DownloadError::ChecksumFailed {
            file,
            expected,
            actual,
        } => {
            tracing::warn!("Artifact '{file}' does not match its declared digest");
            ResolveError::IntegrityMismatch {
                artifact: file,
                expected,
                actual,
            }
        }
        other => ResolveError::Download(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::Channel;

    const HASH_A: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    const HASH_B: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn component(name: &str, hash: &str) -> ComponentArtifact {
        ComponentArtifact {
            name: name.to_string(),
            version: "1.63.0".to_string(),
            url: format!("https://dist.example/{name}.tar.gz"),
            hash: Sha256Digest::parse(hash).unwrap(),
        }
    }

    fn plan() -> ResolutionPlan {
        let entry = IndexEntry {
            version: "1.4.2".to_string(),
            url: "https://idx.example/mold.tar.gz".to_string(),
            sha256: Sha256Digest::parse(HASH_A).unwrap(),
            bin: vec!["bin".to_string()],
            include: vec![],
            lib: vec!["lib".to_string()],
        };
        ResolutionPlan {
            project: "mil".to_string(),
            platform: Platform::X86_64Linux,
            channel: "1.63.0".to_string(),
            toolchain_version: "1.63.0".to_string(),
            manifest_digest: Sha256Digest::of(b"manifest"),
            components: vec![component("rustc", HASH_A), component("cargo", HASH_B)],
            index_revision: "nixos-22.05".to_string(),
            index_digest: Sha256Digest::of(b"index"),
            packages: BTreeMap::from([("mold".to_string(), entry)]),
            vars: BTreeMap::new(),
        }
    }

    #[test]
    fn test_toolchain_key_depends_on_components() {
        let base = plan();
        let mut other = plan();
        other.components[1].hash = Sha256Digest::parse(HASH_A).unwrap();
        assert_eq!(base.toolchain_key(), plan().toolchain_key());
        assert_ne!(base.toolchain_key(), other.toolchain_key());
    }

    #[test]
    fn test_plan_fingerprint_matches_environment() {
        let plan = plan();
        let roots = BTreeMap::from([("mold".to_string(), PathBuf::from("/store/mold"))]);
        let env = plan.environment(PathBuf::from("/store/rust"), &roots);
        assert_eq!(plan.fingerprint(), env.fingerprint());
        assert_eq!(
            env.packages["mold"].lib,
            vec![PathBuf::from("/store/mold/lib")]
        );
    }

    #[test]
    fn test_checksum_failure_becomes_integrity_mismatch() {
        let err = integrity_error(DownloadError::ChecksumFailed {
            file: "https://dist.example/rustc.tar.gz".to_string(),
            expected: "sha256:aa".to_string(),
            actual: "sha256:bb".to_string(),
        });
        assert!(matches!(err, ResolveError::IntegrityMismatch { .. }));

        let err = integrity_error(DownloadError::NetworkError {
            url: "u".to_string(),
            error: "refused".to_string(),
        });
        assert!(matches!(err, ResolveError::Download(_)));
    }

    #[tokio::test]
    async fn test_unsupported_platform_fails_before_io() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut descriptor = Descriptor::new("mil", "stable".parse::<Channel>().unwrap());
        descriptor.platforms.supported = vec!["x86_64-linux".to_string()];
        // Unroutable URLs: any network access would fail with a different error
        descriptor.toolchain.dist_url = Some("http://127.0.0.1:9".to_string());
        descriptor.index.url = Some("http://127.0.0.1:9".to_string());

        let dirs = MilenvDirs::rooted(temp.path());
        let resolver = Resolver::new(descriptor, &GlobalConfig::default(), &dirs);

        for platform in ["aarch64-darwin", "riscv64-linux", ""] {
            let err = resolver.resolve(platform).await.unwrap_err();
            assert!(
                matches!(err, ResolveError::PlatformUnsupported { .. }),
                "{platform}: {err:?}"
            );
        }
        assert!(!dirs.store_dir().exists());
    }

    #[test]
    fn test_with_toolchain_overrides_pin() {
        let temp = tempfile::TempDir::new().unwrap();
        let descriptor = Descriptor::new("mil", "stable".parse::<Channel>().unwrap());
        let resolver = Resolver::new(
            descriptor,
            &GlobalConfig::default(),
            &MilenvDirs::rooted(temp.path()),
        );
        let pin = ToolchainPin::new(
            "1.63.0".parse().unwrap(),
            Sha256Digest::parse(HASH_B).unwrap(),
        );
        let resolver = resolver.with_toolchain(pin.clone());
        assert_eq!(resolver.descriptor().pin(), pin);
    }
}
