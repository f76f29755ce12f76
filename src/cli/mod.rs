//! CLI module for the pairtest harness
//!
//! ## Commands
//!
//! - `run [path]` - Run every test script under a path
//! - `perf [patterns...]` - Run the performance suites
//! - `results <file>...` - Print stored performance results
//!
//! ## Modules
//!
//! - `commands` - Command implementations
//! - `script_runner` - Test script execution and reporting
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod script_runner;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::harness::{Interrupt, ProcessLauncher};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create a failure error from a diagnostic, rendered with its code and help.
    pub fn diagnostic<E>(err: E) -> Self
    where
        E: miette::Diagnostic + Send + Sync + 'static,
    {
        Self::failure(format!("{:?}", miette::Report::new(err)))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// A process launcher that Ctrl-C interrupts.
fn interruptible_launcher() -> CliResult<ProcessLauncher> {
    ProcessLauncher::new(Interrupt::install_ctrlc())
        .map_err(|e| CliError::failure(format!("Error: cannot start the process runtime: {e}")))
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Client/server test harness for RPC middleware test suites
#[derive(Parser, Debug)]
#[command(name = "pairtest")]
#[command(version = VERSION)]
#[command(about = "Run client/server test pairs and performance suites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test scripts (*.pairtest.json), stopping at the first failure
    Run {
        /// Script file or directory to search
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
        /// Host passed to clients and servers as --Ice.Default.Host
        #[arg(long)]
        host: Option<String>,
        /// Seconds to wait for a server's readiness signal (default: wait forever)
        #[arg(long = "readiness-timeout", value_name = "SECS")]
        readiness_timeout: Option<u64>,
        /// Harness config file (default: config/pairtest.json under the toplevel directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the performance suites of every product whose home variable is set
    Perf {
        /// Number of times every case is run (0 runs nothing)
        #[arg(short = 'i', long = "iter", value_name = "N", default_value_t = 1)]
        iterations: u32,
        /// Results file (default: results.ice.<os>.<host>)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Host name recorded with the results
        #[arg(short = 'n', long = "hostname", value_name = "HOST")]
        hostname: Option<String>,
        /// Also print the summary as CSV
        #[arg(long)]
        csv: bool,
        /// Regexes matched against the start of "product group case"
        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,
    },

    /// Print stored performance results side by side
    Results {
        /// Results files, one column per host
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Run {
            path,
            host,
            readiness_timeout,
            config,
            verbose,
        } => script_runner::run_scripts(
            &path,
            &script_runner::RunOptions {
                host,
                readiness_timeout,
                config,
                verbose,
            },
        ),
        Command::Perf {
            iterations,
            output,
            hostname,
            csv,
            patterns,
        } => commands::perf(iterations, output, hostname, csv, patterns),
        Command::Results { files, csv } => commands::print_results(&files, csv),
    }
}

// ============================================================================
// Tests
// ============================================================================
