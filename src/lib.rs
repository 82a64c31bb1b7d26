//! milenv - reproducible development shells
//!
//! Evaluates an environment descriptor (`milenv.toml`) into a shell whose
//! search path exposes a pinned compiler toolchain and a fixed set of
//! prebuilt packages, identically on every machine of the same platform.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Domain types and the resolution pipeline
//! - [`infra`] - Infrastructure layer (network, filesystem, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
