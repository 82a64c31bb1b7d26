//! milenv CLI - reproducible development shells
//!
//! Entry point for the milenv command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use milenv::cli::output::{display_error, OutputConfig};
use milenv::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    // RUST_LOG wins over -v
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(output_config.log_level())),
        )
        .init();

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
