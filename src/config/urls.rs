//! Package index and toolchain distribution URLs

/// Package index base URL
pub const PACKAGE_INDEX: &str = "https://index.milenv.dev";

/// Rust toolchain distribution server
pub const TOOLCHAIN_DIST: &str = "https://static.rust-lang.org/dist";
