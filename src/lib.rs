#![forbid(unsafe_code)]
//! pairtest: client/server test harness
//!
//! Launches server/client (or collocated) processes from structured command descriptors, waits for readiness
//! lines on their output, relays client output, decides pass/fail from exit codes and kills stray servers when a
//! pair fails. The performance driver records one value per case and iteration and aggregates them with
//! `pairtest_core`.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` and `harness` modules
//!   enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod cli;
pub mod config;
pub mod harness;
pub mod perf;
pub mod suite;

pub use config::{ConfigError, HarnessConfig};
pub use harness::{CommandSpec, HarnessError, PairRunner, PidRegistry, ReadinessStrategy, ServerSpec, Timeouts};
