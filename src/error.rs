//! Error types for milenv
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Descriptor (milenv.toml) errors
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// Descriptor file not found
    #[error("Descriptor not found at '{path}'. Run 'milenv init' to create one.")]
    NotFound { path: PathBuf },

    /// Descriptor already exists
    #[error("Descriptor already exists at '{path}'. Use --force to overwrite it")]
    AlreadyExists { path: PathBuf },

    /// Failed to parse descriptor TOML
    #[error("Failed to parse descriptor: {error}")]
    Parse { error: String },

    /// Environment variable referenced by the descriptor is not set
    #[error("Environment variable '{name}' referenced in descriptor is not set")]
    UndefinedVariable { name: String },

    /// Field has an invalid value
    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// IO error while reading or writing the descriptor
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Resolution errors
///
/// Every variant is fatal: a failed resolution never yields an environment.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Platform outside the descriptor's supported set
    #[error("Platform '{platform}' is not supported. Supported platforms: {}", supported.join(", "))]
    PlatformUnsupported {
        platform: String,
        supported: Vec<String>,
    },

    /// Fetched artifact does not match its declared digest
    #[error("Integrity mismatch for '{artifact}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// The toolchain pin carries no digest
    #[error("Toolchain channel '{channel}' has no pinned digest. Run 'milenv pin' to record one")]
    MissingDigest { channel: String },

    /// Channel manifest could not be understood
    #[error("Invalid channel manifest for '{channel}': {error}")]
    InvalidChannelManifest { channel: String, error: String },

    /// Toolchain component not published for the platform
    #[error("Component '{component}' is not available for '{target}' on channel '{channel}'")]
    ComponentUnavailable {
        component: String,
        target: String,
        channel: String,
    },

    /// Package index document could not be understood
    #[error("Invalid package index at '{url}': {error}")]
    InvalidIndex { url: String, error: String },

    /// Dependency missing from the package index
    #[error("Package '{name}' not found in index revision '{revision}' for platform '{platform}'")]
    PackageNotFound {
        name: String,
        revision: String,
        platform: String,
    },

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}': expected {expected}, got {actual}")]
    ChecksumFailed {
        file: String,
        expected: String,
        actual: String,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to unpack an archive
    #[error("Failed to extract '{archive}': {error}")]
    Extract { archive: PathBuf, error: String },

    /// Archive layout not understood
    #[error("Unexpected layout in '{archive}': {message}")]
    Layout { archive: PathBuf, message: String },

    /// Failed to publish an entry into the store
    #[error("Failed to publish store entry '{path}': {error}")]
    Publish { path: PathBuf, error: String },

    /// Failed to remove the store
    #[error("Failed to remove '{path}': {error}")]
    Remove { path: PathBuf, error: String },
}

/// Lock file errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock file missing while --locked was requested
    #[error("Lock file not found at '{path}'. Run 'milenv lock' first")]
    NotFound { path: PathBuf },

    /// Lock file could not be parsed
    #[error("Failed to parse lock file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Lock file could not be written
    #[error("Failed to write lock file '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Fresh resolution differs from the lock
    #[error("Resolution for '{platform}' differs from lock file: {detail}")]
    Mismatch { platform: String, detail: String },

    /// Platform absent from the lock
    #[error("Lock file has no entry for platform '{platform}'")]
    MissingPlatform { platform: String },
}

/// Shell activation errors
#[derive(Error, Debug)]
pub enum ShellError {
    /// Unknown shell kind
    #[error("Unsupported shell '{name}'. Supported shells: bash, zsh, fish")]
    UnsupportedShell { name: String },

    /// Failed to spawn the shell or command
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },
}

/// Top-level milenv error type
#[derive(Error, Debug)]
pub enum MilenvError {
    /// Descriptor error
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Resolution error
    #[error("Resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Lock error
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Shell error
    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

impl From<DownloadError> for MilenvError {
    fn from(err: DownloadError) -> Self {
        Self::Resolve(ResolveError::from(err))
    }
}
