//! Provide result aggregation, summary statistics, rendering and case filtering for the pairtest harness.
//!
//! This crate is intentionally small and dependency-light. It knows nothing about processes:
//! - the harness records one numeric value per (host, test, iteration) here, and
//! - the CLI renders the accumulated samples as a table or as comma-delimited rows.
//!
//! ## Notes
//!
//! - The only IO is reading and writing results files (`HostResults::open` / `HostResults::save`).
//! - Test names are case *descriptors* (`"product group case"`, see [`filter::descriptor`]); the same string is used
//!   for filtering and as the results key so a filter pattern and a results row always agree.

pub mod errors;
pub mod filter;
pub mod render;
pub mod results;
pub mod stats;

pub use errors::{FilterError, ResultsError};
pub use filter::{CaseFilter, descriptor};
pub use render::RenderFormat;
pub use results::{AllResults, HostResults, ResultRecord};
pub use stats::{Statistic, Summary};
