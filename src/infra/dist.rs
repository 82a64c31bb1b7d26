//! Toolchain distribution channel client
//!
//! Fetches the channel manifest for a [`Channel`], checks it against the
//! pinned digest, and selects the component tarballs for a platform.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::core::channel::ToolchainPin;
use crate::core::digest::Sha256Digest;
use crate::core::platform::Platform;
use crate::error::ResolveError;
use crate::infra::download::DownloadManager;
use crate::infra::store::is_entry_component;

/// Target key used for target-independent packages
const ANY_TARGET: &str = "*";

/// Distribution manifest (`channel-rust-*.toml`, format version 2)
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelManifest {
    #[serde(rename = "manifest-version")]
    pub manifest_version: String,

    pub date: String,

    #[serde(default)]
    pub pkg: BTreeMap<String, ManifestPackage>,

    #[serde(default)]
    pub renames: BTreeMap<String, ManifestRename>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestPackage {
    pub version: String,

    #[serde(default)]
    pub target: BTreeMap<String, ManifestTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestTarget {
    #[serde(default)]
    pub available: bool,

    pub url: Option<String>,

    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRename {
    pub to: String,
}

/// A component tarball selected for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentArtifact {
    pub name: String,
    pub version: String,
    pub url: String,
    pub hash: Sha256Digest,
}

/// Channel manifest whose digest matched the pin
#[derive(Debug, Clone)]
pub struct VerifiedManifest {
    pub manifest: ChannelManifest,
    pub digest: Sha256Digest,
}

impl ChannelManifest {
    /// Parse manifest TOML
    pub fn parse(channel: &str, content: &str) -> Result<Self, ResolveError> {
        let manifest: Self =
            toml::from_str(content).map_err(|e| ResolveError::InvalidChannelManifest {
                channel: channel.to_string(),
                error: e.to_string(),
            })?;
        if manifest.manifest_version != "2" {
            return Err(ResolveError::InvalidChannelManifest {
                channel: channel.to_string(),
                error: format!(
                    "unsupported manifest-version '{}'",
                    manifest.manifest_version
                ),
            });
        }
        Ok(manifest)
    }

    /// Version of rustc, without the commit suffix
    ///
    /// A version that cannot name a store entry counts as absent.
    pub fn rustc_version(&self) -> Option<&str> {
        self.pkg
            .get("rustc")
            .and_then(|p| p.version.split_whitespace().next())
            .filter(|v| is_entry_component(v))
    }

    /// Select the tarballs of `components` for `platform`
    pub fn select(
        &self,
        channel: &str,
        components: &[String],
        platform: Platform,
    ) -> Result<Vec<ComponentArtifact>, ResolveError> {
        let triple = platform.rust_triple();
        let unavailable = |component: &str| ResolveError::ComponentUnavailable {
            component: component.to_string(),
            target: triple.to_string(),
            channel: channel.to_string(),
        };

        components
            .iter()
            .map(|requested| {
                let name = self
                    .renames
                    .get(requested)
                    .map_or(requested.as_str(), |r| r.to.as_str());
                let package = self.pkg.get(name).ok_or_else(|| unavailable(requested))?;
                let target = package
                    .target
                    .get(triple)
                    .or_else(|| package.target.get(ANY_TARGET))
                    .filter(|t| t.available)
                    .ok_or_else(|| unavailable(requested))?;

                let (Some(url), Some(hash)) = (&target.url, &target.hash) else {
                    return Err(unavailable(requested));
                };
                let hash = Sha256Digest::parse(hash).map_err(|error| {
                    ResolveError::InvalidChannelManifest {
                        channel: channel.to_string(),
                        error,
                    }
                })?;

                Ok(ComponentArtifact {
                    name: requested.clone(),
                    version: package.version.clone(),
                    url: url.clone(),
                    hash,
                })
            })
            .collect()
    }
}

/// Client for a toolchain distribution server
#[derive(Debug, Clone)]
pub struct DistClient {
    downloads: DownloadManager,
    dist_url: String,
}

impl DistClient {
    pub fn new(downloads: DownloadManager, dist_url: impl Into<String>) -> Self {
        Self {
            downloads,
            dist_url: dist_url.into(),
        }
    }

    /// Fetch the channel manifest and verify it against the pin
    ///
    /// The digest is checked before the manifest is parsed, so a tampered
    /// manifest is never interpreted.
    pub async fn fetch_manifest(&self, pin: &ToolchainPin) -> Result<VerifiedManifest, ResolveError> {
        let channel = pin.channel.to_string();
        let expected = pin
            .digest
            .as_ref()
            .ok_or_else(|| ResolveError::MissingDigest {
                channel: channel.clone(),
            })?;

        let (content, digest) = self.fetch_unverified(pin).await?;
        if digest != *expected {
            tracing::warn!("Channel manifest for '{channel}' does not match the pinned digest");
            return Err(ResolveError::IntegrityMismatch {
                artifact: pin.channel.manifest_name(),
                expected: expected.to_string(),
                actual: digest.to_string(),
            });
        }

        let text = String::from_utf8(content).map_err(|e| ResolveError::InvalidChannelManifest {
            channel: channel.clone(),
            error: e.to_string(),
        })?;
        let manifest = ChannelManifest::parse(&channel, &text)?;
        tracing::info!(
            "Channel '{channel}' manifest verified (dated {})",
            manifest.date
        );

        Ok(VerifiedManifest { manifest, digest })
    }

    /// Fetch the manifest without checking it, returning its digest
    ///
    /// Used by `milenv pin` to record a digest in the first place.
    pub async fn fetch_unverified(
        &self,
        pin: &ToolchainPin,
    ) -> Result<(Vec<u8>, Sha256Digest), ResolveError> {
        let url = pin.channel.manifest_url(&self.dist_url);
        let content = self.downloads.fetch(&url).await?;
        let digest = Sha256Digest::of(&content);
        Ok((content, digest))
    }
}
