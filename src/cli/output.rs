//! Output formatting and progress indicators
//!
//! Human-readable messages go to stdout, warnings and errors to stderr.
//! `--quiet` silences everything but errors; `--json` replaces messages
//! with a single JSON document per command.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

static QUIET: AtomicBool = AtomicBool::new(false);
static JSON: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicU8 = AtomicU8::new(0);

/// Global output settings taken from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make these settings visible to every output helper
    pub fn apply_global(self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        JSON.store(self.json, Ordering::Relaxed);
        VERBOSE.store(self.verbose, Ordering::Relaxed);
    }

    /// Tracing filter directive for the verbosity level
    pub fn log_level(self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

pub fn verbosity() -> u8 {
    VERBOSE.load(Ordering::Relaxed)
}

fn human() -> bool {
    !is_quiet() && !is_json()
}

/// Print a success message
pub fn print_success(message: &str) {
    if human() {
        println!("{} {message}", status::SUCCESS);
    }
}

/// Print an informational message
pub fn print_info(message: &str) {
    if human() {
        println!("{} {message}", status::INFO);
    }
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    if human() {
        println!("  {message}");
    }
}

/// Print a warning to stderr
pub fn print_warning(message: &str) {
    if human() {
        eprintln!("{} {message}", status::WARNING);
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    if is_json() {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        let document = serde_json::json!({
            "error": error.to_string(),
            "causes": causes,
        });
        eprintln!("{document}");
        return;
    }

    eprintln!("{} Error: {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
///
/// Hidden in quiet and JSON modes.
pub fn create_spinner(message: &str) -> ProgressBar {
    if !human() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_follows_verbosity() {
        assert_eq!(OutputConfig::new(false, false, 0).log_level(), "warn");
        assert_eq!(OutputConfig::new(false, false, 1).log_level(), "info");
        assert_eq!(OutputConfig::new(false, false, 2).log_level(), "debug");
        assert_eq!(OutputConfig::new(false, false, 9).log_level(), "trace");
    }
}
