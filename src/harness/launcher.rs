//! Process launching and handles.
//!
//! Children are `tokio::process` children driven by the launcher's current-thread runtime, so a run still executes
//! one pair at a time. With [`StderrMode::Merge`] the child's stdout and stderr are the same socket, which keeps
//! the two in the order the child wrote them.

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::{Builder, Runtime};

use super::command::{CommandSpec, StderrMode};
use super::error::HarnessError;
use super::interrupt::Interrupt;
use super::stream::{self, Deadline, LineStream, WaitError};

type Output = Box<dyn AsyncRead + Send + Unpin>;

/// Starts subprocesses and wires their output into a [`LineStream`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    runtime: Arc<Runtime>,
    interrupt: Interrupt,
}

impl ProcessLauncher {
    /// A launcher with its own current-thread runtime.
    pub fn new(interrupt: Interrupt) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            interrupt,
        })
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Drive `fut` to completion on the launcher's runtime.
    ///
    /// Must not be called from inside a runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Spawn `spec`. A spawn failure is returned as [`HarnessError::Start`]; there is no retry.
    ///
    /// Must be called from within the runtime that will drive the handle, normally through
    /// [`block_on`](Self::block_on).
    pub fn launch(&self, role: &str, spec: &CommandSpec) -> Result<ProcessHandle, HarnessError> {
        let start_failed = |source: io::Error| HarnessError::Start {
            command: spec.to_string(),
            source,
        };

        let mut command = spec.to_command();
        let merged = match spec.stderr {
            StderrMode::Merge => merge_output(&mut command).map_err(start_failed)?,
            StderrMode::Discard | StderrMode::Inherit => None,
        };
        let mut child = command.spawn().map_err(start_failed)?;
        // The command holds our copies of a merged channel's write side; end-of-file needs them closed.
        drop(command);

        let pid = child
            .id()
            .ok_or_else(|| start_failed(io::Error::other("process exited before its pid was read")))?;
        tracing::debug!(role, pid, command = %spec, "spawned process");

        let output: Output = match (merged, child.stdout.take(), child.stderr.take()) {
            (Some(merged), _, _) => merged,
            (None, Some(stdout), Some(stderr)) => Box::new(stdout.chain(stderr)),
            (None, Some(stdout), None) => Box::new(stdout),
            (None, None, _) => Box::new(tokio::io::empty()),
        };

        Ok(ProcessHandle {
            role: role.to_string(),
            pid,
            child,
            stream: LineStream::new(output, self.interrupt.clone()),
            status: None,
            interrupt: self.interrupt.clone(),
        })
    }
}

/// Point the child's stdout and stderr at one end of a socket pair and return the other end.
#[cfg(unix)]
fn merge_output(command: &mut Command) -> io::Result<Option<Output>> {
    use std::os::fd::OwnedFd;

    let (ours, theirs) = tokio::net::UnixStream::pair()?;
    let theirs = theirs.into_std()?;
    theirs.set_nonblocking(false)?;
    let stderr = theirs.try_clone()?;
    command.stdout(OwnedFd::from(theirs)).stderr(OwnedFd::from(stderr));
    Ok(Some(Box::new(ours)))
}

/// Without a shared channel stderr is piped separately and read after stdout.
#[cfg(not(unix))]
fn merge_output(_command: &mut Command) -> io::Result<Option<Output>> {
    Ok(None)
}

/// One running (or joined) subprocess. Dropping an unjoined handle kills the process.
pub struct ProcessHandle {
    role: String,
    pid: u32,
    child: Child,
    stream: LineStream,
    status: Option<ExitStatus>,
    interrupt: Interrupt,
}

impl ProcessHandle {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The process's readable output.
    pub fn stream(&mut self) -> &mut LineStream {
        &mut self.stream
    }

    /// Exit status, available once [`close`](Self::close) has returned.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Discard remaining output, then wait for the process to exit.
    ///
    /// If the deadline passes the process is killed and [`HarnessError::TimedOut`] is returned.
    pub async fn close(&mut self, deadline: Deadline) -> Result<ExitStatus, HarnessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let drained = self.stream.drain(deadline).await;
        let drained = match drained {
            Ok(lines) => lines,
            Err(e) => return Err(self.abort(e, "end of output").await),
        };
        if drained > 0 {
            tracing::debug!(role = %self.role, lines = drained, "discarded unread output");
        }

        let exited = stream::wait(self.child.wait(), deadline, &self.interrupt).await;
        let status = match exited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(self.abort(WaitError::Io(e), "exit").await),
            Err(e) => return Err(self.abort(e, "exit").await),
        };
        tracing::debug!(role = %self.role, pid = self.pid, %status, "process exited");
        self.status = Some(status);
        Ok(status)
    }

    async fn abort(&mut self, err: WaitError, waiting_for: &str) -> HarnessError {
        self.kill().await;
        err.into_harness(&self.role, waiting_for)
    }

    /// Kill and reap the process if it has not been joined.
    pub async fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            tracing::debug!(role = %self.role, pid = self.pid, "ignoring kill failure: {}", e);
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn launcher() -> ProcessLauncher {
        ProcessLauncher::new(Interrupt::new()).unwrap()
    }

    /// Launch `spec` and read its whole output, returning the output and the exit status.
    fn run_to_end(spec: &CommandSpec) -> (String, ExitStatus) {
        let launcher = launcher();
        launcher.block_on(async {
            let mut handle = launcher.launch("client", spec).unwrap();
            let output = handle.stream().read_to_end(Deadline::none()).await.unwrap();
            let status = handle.close(Deadline::none()).await.unwrap();
            (output, status)
        })
    }

    #[test]
    fn test_launch_missing_program_is_start_failure() {
        let launcher = launcher();
        let err = launcher
            .block_on(async { launcher.launch("server", &CommandSpec::new("/nonexistent/pairtest-server")).err() })
            .unwrap();
        assert!(matches!(err, HarnessError::Start { .. }));
    }

    #[test]
    fn test_merged_stderr_reaches_stream() {
        let (output, status) = run_to_end(&sh("echo to-stderr 1>&2"));
        assert_eq!(output, "to-stderr\n");
        assert!(status.success());
    }

    #[test]
    fn test_merged_output_keeps_write_order() {
        let script = "i=1; while [ $i -le 300 ]; do echo out$i; echo err$i 1>&2; i=$((i+1)); done";
        let (output, status) = run_to_end(&sh(script));
        let expected: String = (1..=300).map(|i| format!("out{i}\nerr{i}\n")).collect();
        assert_eq!(output, expected);
        assert!(status.success());
    }

    #[test]
    fn test_discarded_stderr_is_not_read() {
        let (output, _) = run_to_end(&sh("echo hidden 1>&2; echo shown").stderr(StderrMode::Discard));
        assert_eq!(output, "shown\n");
    }

    #[test]
    fn test_close_reports_exit_status() {
        let launcher = launcher();
        launcher.block_on(async {
            let mut handle = launcher.launch("client", &sh("exit 3")).unwrap();
            let status = handle.close(Deadline::none()).await.unwrap();
            assert_eq!(status.code(), Some(3));
            assert_eq!(handle.status().and_then(|s| s.code()), Some(3));
        });
    }

    #[test]
    fn test_close_with_deadline_kills_hung_process() {
        let launcher = launcher();
        let err = launcher.block_on(async {
            let mut handle = launcher.launch("server", &CommandSpec::new("sleep").arg("30")).unwrap();
            handle.close(Deadline::after(Some(Duration::from_millis(200)))).await.unwrap_err()
        });
        assert!(matches!(err, HarnessError::TimedOut { .. }));
    }

    #[test]
    fn test_close_is_cut_short_by_interrupt() {
        let interrupt = Interrupt::new();
        let launcher = ProcessLauncher::new(interrupt.clone()).unwrap();
        let err = launcher.block_on(async {
            let mut handle = launcher.launch("server", &CommandSpec::new("sleep").arg("30")).unwrap();
            interrupt.trigger();
            handle.close(Deadline::none()).await.unwrap_err()
        });
        assert!(err.is_interrupt());
    }

    #[test]
    fn test_env_and_cwd_are_applied() {
        let spec = sh("echo $PAIRTEST_MARKER; pwd").env("PAIRTEST_MARKER", "marker").current_dir("/");
        let (output, _) = run_to_end(&spec);
        assert_eq!(output, "marker\n/\n");
    }
}
