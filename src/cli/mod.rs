//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use commands::Commands;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_SHA"),
    "\ntarget: ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

/// milenv - reproducible development shells
///
/// Resolve a pinned toolchain and a fixed set of packages into a shell
/// environment that is identical on every machine of the same platform.
#[derive(Parser, Debug)]
#[command(name = "milenv")]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub async fn run(self) -> Result<i32> {
        let Some(cmd) = self.command else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            return Ok(0);
        };

        let dir = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        cmd.run(&dir).await
    }
}
