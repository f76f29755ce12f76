//! Harness failure taxonomy.
//!
//! Every variant aborts the pair that raised it. The runner sweeps tracked servers before handing the error up;
//! the CLI turns it into exit code 1.

use std::io;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while running a server/client pair.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("failed to start `{command}`: {source}")]
    #[diagnostic(code(pairtest::start), help("check that the program exists and is executable"))]
    Start { command: String, source: io::Error },

    #[error("{role} closed its output before signalling readiness ({expected})")]
    #[diagnostic(code(pairtest::not_ready))]
    NotReady { role: String, expected: String },

    #[error("{role} printed `{line}` where a process id was expected")]
    #[diagnostic(code(pairtest::bad_pid), help("servers started in exec-interop mode must print their pid first"))]
    BadPid { role: String, line: String },

    #[error("{role} produced no {waiting_for} within {}s", .timeout.as_secs_f64())]
    #[diagnostic(code(pairtest::timed_out))]
    TimedOut {
        role: String,
        waiting_for: String,
        timeout: Duration,
    },

    #[error("interrupted while waiting for {role}")]
    #[diagnostic(code(pairtest::interrupted))]
    Interrupted { role: String },

    #[error("{role} exited with {status}")]
    #[diagnostic(code(pairtest::exit_status))]
    NonZeroExit { role: String, status: String },

    #[error("client output `{output}` is not a number")]
    #[diagnostic(code(pairtest::bad_result), help("performance clients must print a single floating point value"))]
    BadResult { output: String },

    #[error("I/O error: {0}")]
    #[diagnostic(code(pairtest::io))]
    Io(#[from] io::Error),
}

impl HarnessError {
    /// Whether the failure came from an operator interrupt rather than the processes under test.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, HarnessError::Interrupted { .. })
    }
}
