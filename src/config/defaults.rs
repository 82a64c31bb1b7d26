//! Default configuration values

/// Descriptor file name looked up in the project directory
pub const DESCRIPTOR_FILE: &str = "milenv.toml";

/// Lock file name written next to the descriptor
pub const LOCK_FILE: &str = "milenv.lock";

/// Lock file format version
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// Default number of parallel artifact downloads
pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 4;

/// Toolchain components installed when the descriptor names none
pub const DEFAULT_COMPONENTS: &[&str] = &["rustc", "cargo", "rust-std"];

/// Dependencies a freshly initialized descriptor requests
pub const DEFAULT_PACKAGES: &[&str] = &["clang", "mold", "openssl"];

/// Default toolchain channel for new descriptors
pub const DEFAULT_CHANNEL: &str = "stable";

/// Default package index name and revision for new descriptors
pub const DEFAULT_INDEX_NAME: &str = "nixpkgs";
pub const DEFAULT_INDEX_REVISION: &str = "nixos-22.05";

/// HTTP timeouts (in seconds)
pub const HTTP_TIMEOUT_SECS: u64 = 300;
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
