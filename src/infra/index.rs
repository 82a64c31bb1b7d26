//! Package index client
//!
//! The index publishes one JSON document per (revision, platform) pair at
//! `{index_url}/{revision}/{platform}.json`, mapping package names to
//! prebuilt artifacts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::digest::Sha256Digest;
use crate::core::platform::Platform;
use crate::error::ResolveError;
use crate::infra::download::DownloadManager;
use crate::infra::store::is_entry_component;

/// Index document for one revision and platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIndex {
    pub revision: String,
    pub platform: Platform,
    #[serde(default)]
    pub packages: BTreeMap<String, IndexEntry>,
}

/// Prebuilt artifact for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub version: String,
    pub url: String,
    pub sha256: Sha256Digest,

    /// Directories holding executables, relative to the artifact root
    #[serde(default = "default_bin")]
    pub bin: Vec<String>,

    /// Header directories
    #[serde(default)]
    pub include: Vec<String>,

    /// Library directories
    #[serde(default)]
    pub lib: Vec<String>,
}

fn default_bin() -> Vec<String> {
    vec!["bin".to_string()]
}

/// Index document whose digest was checked (when pinned)
#[derive(Debug, Clone)]
pub struct FetchedIndex {
    pub index: PackageIndex,
    pub digest: Sha256Digest,
    pub url: String,
}

impl PackageIndex {
    /// Parse an index document and check it describes what was asked for
    pub fn parse(
        url: &str,
        content: &[u8],
        revision: &str,
        platform: Platform,
    ) -> Result<Self, ResolveError> {
        let invalid = |error: String| ResolveError::InvalidIndex {
            url: url.to_string(),
            error,
        };
        let index: Self = serde_json::from_slice(content).map_err(|e| invalid(e.to_string()))?;
        if index.revision != revision {
            return Err(invalid(format!(
                "document is for revision '{}', expected '{revision}'",
                index.revision
            )));
        }
        if index.platform != platform {
            return Err(invalid(format!(
                "document is for platform '{}', expected '{platform}'",
                index.platform
            )));
        }
        for (name, entry) in &index.packages {
            if !is_entry_component(&entry.version) {
                return Err(invalid(format!(
                    "package '{name}' has invalid version '{}'",
                    entry.version
                )));
            }
            for dir in entry.bin.iter().chain(&entry.include).chain(&entry.lib) {
                if dir.starts_with('/') || dir.split('/').any(|part| part == "..") {
                    return Err(invalid(format!(
                        "package '{name}' declares path '{dir}' outside its artifact"
                    )));
                }
            }
        }
        Ok(index)
    }

    /// Look up every dependency, failing on the first missing one
    pub fn lookup(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, IndexEntry>, ResolveError> {
        names
            .iter()
            .map(|name| {
                self.packages
                    .get(name)
                    .map(|entry| (name.clone(), entry.clone()))
                    .ok_or_else(|| ResolveError::PackageNotFound {
                        name: name.clone(),
                        revision: self.revision.clone(),
                        platform: self.platform.to_string(),
                    })
            })
            .collect()
    }
}

/// Client for a package index server
#[derive(Debug, Clone)]
pub struct IndexClient {
    downloads: DownloadManager,
    index_url: String,
}

impl IndexClient {
    pub fn new(downloads: DownloadManager, index_url: impl Into<String>) -> Self {
        Self {
            downloads,
            index_url: index_url.into(),
        }
    }

    /// URL of the document for a revision and platform
    pub fn document_url(&self, revision: &str, platform: Platform) -> String {
        format!(
            "{}/{revision}/{platform}.json",
            self.index_url.trim_end_matches('/')
        )
    }

    /// Fetch the index document, verifying it when a digest is pinned
    pub async fn fetch(
        &self,
        revision: &str,
        platform: Platform,
        pinned: Option<&Sha256Digest>,
    ) -> Result<FetchedIndex, ResolveError> {
        let url = self.document_url(revision, platform);
        let content = self.downloads.fetch(&url).await?;
        let digest = Sha256Digest::of(&content);

        if let Some(expected) = pinned {
            if digest != *expected {
                return Err(ResolveError::IntegrityMismatch {
                    artifact: url,
                    expected: expected.to_string(),
                    actual: digest.to_string(),
                });
            }
        }

        let index = PackageIndex::parse(&url, &content, revision, platform)?;
        tracing::info!(
            "Index revision '{revision}' lists {} packages for {platform}",
            index.packages.len()
        );
        Ok(FetchedIndex { index, digest, url })
    }
}
