//! Readiness gates.
//!
//! A server declares an ordered list of [`ReadinessStrategy`] values and the gate awaits each in turn. Reaching
//! end-of-stream first is always a hard failure: a server that never says it is ready is not trusted to serve
//! the client that would follow.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::HarnessError;
use super::registry::PidRegistry;
use super::stream::{Deadline, LineStream};

/// One readiness signal expected on a server's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStrategy {
    /// Any non-empty line; the adapter prints a banner once it is active.
    AdapterReady,
    /// A line equal to `"<name> ready"`.
    Service(String),
    /// The first non-empty line is the server's pid, kept for the termination sweep.
    ProcessId,
}

impl ReadinessStrategy {
    /// The line that satisfies a [`Service`](Self::Service) strategy.
    pub fn token_line(name: &str) -> String {
        format!("{name} ready")
    }
}

impl fmt::Display for ReadinessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStrategy::AdapterReady => write!(f, "adapter ready banner"),
            ReadinessStrategy::Service(name) => write!(f, "`{}`", Self::token_line(name)),
            ReadinessStrategy::ProcessId => write!(f, "process id"),
        }
    }
}

/// Await every strategy in order on `stream`.
///
/// ## Returns
/// - The pids recorded by `ProcessId` strategies, so the caller can forget them once the server is joined.
///
/// ## Errors
/// - [`HarnessError::NotReady`] if the stream ends first.
/// - [`HarnessError::BadPid`] if a `ProcessId` line is not a bare integer.
/// - [`HarnessError::TimedOut`] / [`HarnessError::Interrupted`] if the wait is cut short.
pub async fn await_readiness(
    role: &str,
    stream: &mut LineStream,
    strategies: &[ReadinessStrategy],
    registry: &mut PidRegistry,
    deadline: Deadline,
) -> Result<Vec<u32>, HarnessError> {
    let mut pids = Vec::new();
    for strategy in strategies {
        if let Some(pid) = await_one(role, stream, strategy, deadline).await? {
            registry.track(pid);
            pids.push(pid);
        }
        tracing::debug!(role, %strategy, "readiness signal observed");
    }
    Ok(pids)
}

async fn await_one(
    role: &str,
    stream: &mut LineStream,
    strategy: &ReadinessStrategy,
    deadline: Deadline,
) -> Result<Option<u32>, HarnessError> {
    let waiting_for = strategy.to_string();
    loop {
        let line = stream
            .next_line(deadline)
            .await
            .map_err(|e| e.into_harness(role, &waiting_for))?
            .ok_or_else(|| HarnessError::NotReady {
                role: role.to_string(),
                expected: waiting_for.clone(),
            })?;
        let line = line.trim();
        tracing::trace!(role, line, "awaiting readiness");

        match strategy {
            ReadinessStrategy::Service(name) => {
                if line == ReadinessStrategy::token_line(name) {
                    return Ok(None);
                }
            }
            ReadinessStrategy::AdapterReady => {
                if !line.is_empty() {
                    return Ok(None);
                }
            }
            ReadinessStrategy::ProcessId => {
                if line.is_empty() {
                    continue;
                }
                let pid = line.parse::<u32>().map_err(|_| HarnessError::BadPid {
                    role: role.to_string(),
                    line: line.to_string(),
                })?;
                return Ok(Some(pid));
            }
        }
    }
}
