//! Tracked server processes and the forced-termination sweep.

use std::collections::BTreeSet;

/// Pids of servers that were started and may still be running.
///
/// Owned by one harness run and passed by `&mut` to the code that records or sweeps it.
#[derive(Debug, Default)]
pub struct PidRegistry {
    pids: BTreeSet<u32>,
}

impl PidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, pid: u32) {
        tracing::debug!(pid, "tracking server process");
        self.pids.insert(pid);
    }

    /// Forget a pid whose process has been joined.
    pub fn untrack(&mut self, pid: u32) {
        self.pids.remove(&pid);
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Kill every tracked process and clear the set.
    ///
    /// Errors (process already gone, permission denied) are ignored. Sweeping an empty registry does nothing.
    pub fn sweep(&mut self) {
        for pid in std::mem::take(&mut self.pids) {
            terminate(pid);
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => tracing::debug!(pid, "killed tracked server"),
        Err(e) => tracing::debug!(pid, "ignoring kill failure: {}", e),
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .output();
    if let Err(e) = result {
        tracing::debug!(pid, "ignoring kill failure: {}", e);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_on_empty_registry_is_noop() {
        let mut registry = PidRegistry::new();
        registry.sweep();
        registry.sweep();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_untrack_removes_only_that_pid() {
        let mut registry = PidRegistry::new();
        registry.track(10);
        registry.track(11);
        registry.untrack(10);
        assert!(!registry.contains(10));
        assert!(registry.contains(11));
        assert_eq!(registry.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_kills_tracked_process_and_clears() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut registry = PidRegistry::new();
        registry.track(child.id());

        registry.sweep();

        assert!(registry.is_empty());
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_tolerates_processes_already_gone() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let mut registry = PidRegistry::new();
        registry.track(pid);
        registry.sweep();
        assert!(registry.is_empty());
    }
}
