//! Core business logic module
//!
//! Domain types and the resolution pipeline. Network, filesystem and
//! process work is delegated to [`crate::infra`].
//!
//! # Submodules
//!
//! - [`descriptor`] - Descriptor (milenv.toml) parsing and validation
//! - [`platform`] - Supported platform identifiers
//! - [`channel`] - Toolchain channels and pins
//! - [`digest`] - SHA-256 integrity digests
//! - [`resolver`] - Descriptor resolution
//! - [`environment`] - Resolved shell environments
//! - [`lock`] - Lock file handling
//! - [`init`] - Descriptor initialization logic
//! - [`check`] - Offline descriptor validation
//! - [`pin`] - Recording channel manifest digests
//! - [`global_config`] - Global configuration management

pub mod channel;
pub mod check;
pub mod descriptor;
pub mod digest;
pub mod environment;
pub mod global_config;
pub mod init;
pub mod lock;
pub mod pin;
pub mod platform;
pub mod resolver;
