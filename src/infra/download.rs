//! HTTP download functionality
//!
//! Handles fetching manifests and downloading artifacts with checksum
//! verification and bounded parallelism.
//!
//! There is a single attempt per URL. Resolution is deterministic, so a
//! failed fetch is reported to the operator instead of being retried.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::config::defaults;
use crate::core::digest::Sha256Digest;
use crate::error::DownloadError;

/// Download result containing file path and metadata
#[derive(Debug)]
pub struct DownloadResult {
    /// Path to the downloaded file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// SHA256 checksum of the downloaded content
    pub checksum: Sha256Digest,
}

/// A single artifact to fetch and verify
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub dest: PathBuf,
    pub expected: Sha256Digest,
}

/// Download manager for fetching files
#[derive(Debug, Clone)]
pub struct DownloadManager {
    /// HTTP client
    client: reqwest::Client,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
                .connect_timeout(Duration::from_secs(defaults::HTTP_CONNECT_TIMEOUT_SECS))
                .user_agent(concat!("milenv/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Fetch a small document (manifest, index) into memory
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        tracing::debug!("Fetching {url}");
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::NetworkError {
                url: url.to_string(),
                error: format!("HTTP {}", response.status()),
            });
        }

        Ok(response)
    }

    /// Download a file, streaming it to `dest` while hashing
    ///
    /// A partial file is removed when the transfer fails.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadResult, DownloadError> {
        let result = self.download_once(url, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadResult, DownloadError> {
        tracing::debug!("Downloading {url} -> {}", dest.display());
        let response = self.get(url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::IoError {
                path: dest.to_path_buf(),
                error: e.to_string(),
            })?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: dest.to_path_buf(),
                    error: e.to_string(),
                })?;

            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| DownloadError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
            checksum: Sha256Digest::from_hasher(hasher),
        })
    }

    /// Download a file and verify its checksum
    ///
    /// The file is deleted when the checksum does not match.
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected: &Sha256Digest,
    ) -> Result<DownloadResult, DownloadError> {
        let result = self.download(url, dest).await?;

        if result.checksum != *expected {
            let _ = tokio::fs::remove_file(dest).await;

            return Err(DownloadError::ChecksumFailed {
                file: url.to_string(),
                expected: expected.to_string(),
                actual: result.checksum.to_string(),
            });
        }

        Ok(result)
    }

    /// Download multiple files in parallel
    ///
    /// Results come back in request order.
    pub async fn download_parallel(
        &self,
        downloads: Vec<DownloadRequest>,
        max_parallel: usize,
    ) -> Vec<Result<DownloadResult, DownloadError>> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));

        let handles: Vec<_> = downloads
            .into_iter()
            .map(|request| {
                let sem = semaphore.clone();
                let mgr = self.clone();

                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.map_err(|e| {
                        DownloadError::NetworkError {
                            url: request.url.clone(),
                            error: e.to_string(),
                        }
                    })?;
                    mgr.download_verified(&request.url, &request.dest, &request.expected)
                        .await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(Err(DownloadError::NetworkError {
                    url: "unknown".to_string(),
                    error: e.to_string(),
                })),
            }
        }

        results
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}
