//! Process pair harness.
//!
//! ## Layout
//!
//! - [`command`]: structured command descriptors
//! - [`launcher`]: spawning children and joining them
//! - [`stream`]: line streams with deadlines and interrupt checks
//! - [`readiness`]: readiness gates on a server's output
//! - [`relay`]: verbatim output forwarding
//! - [`registry`]: pids to kill if a pair fails
//! - [`pair`]: the server/client state machine

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod command;
pub mod error;
pub mod interrupt;
pub mod launcher;
pub mod pair;
pub mod readiness;
pub mod registry;
pub mod relay;
pub mod stream;

pub use command::{CommandSpec, StderrMode, split_options};
pub use error::HarnessError;
pub use interrupt::Interrupt;
pub use launcher::{ProcessHandle, ProcessLauncher};
pub use pair::{Outcome, PairRunner, PairState, ServerSpec, Timeouts};
pub use readiness::{ReadinessStrategy, await_readiness};
pub use registry::PidRegistry;
pub use relay::relay;
pub use stream::{Deadline, LineStream};
