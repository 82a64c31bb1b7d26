//! Infrastructure layer
//!
//! Handles all I/O operations: network, filesystem, and external processes.
//! This module is the only place where side effects occur.

pub mod dirs;
pub mod dist;
pub mod download;
pub mod index;
pub mod shell;
pub mod store;
