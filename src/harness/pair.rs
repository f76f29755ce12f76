//! Server/client pair execution.
//!
//! ## State machine
//!
//! `Idle -> ServerStarting -> ServerReady -> ClientStarting -> ClientRunning -> Done(Pass | Fail)`
//!
//! Collocated runs skip the client states: the single process goes `ServerStarting -> ServerReady ->
//! ClientRunning`. Any failure jumps to `Done(Fail)`, sweeps the tracked servers and returns the error; the run
//! does not continue with later pairs.

use std::io::{self, Write};
use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::command::CommandSpec;
use super::error::HarnessError;
use super::launcher::{ProcessHandle, ProcessLauncher};
use super::readiness::{ReadinessStrategy, await_readiness};
use super::registry::PidRegistry;
use super::relay::relay;
use super::stream::Deadline;

/// A server command plus the readiness signals it must emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    #[serde(flatten)]
    pub command: CommandSpec,
    #[serde(default = "default_readiness")]
    pub readiness: Vec<ReadinessStrategy>,
}

fn default_readiness() -> Vec<ReadinessStrategy> {
    vec![ReadinessStrategy::AdapterReady]
}

impl ServerSpec {
    /// A server that prints the adapter-ready banner.
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            readiness: default_readiness(),
        }
    }

    pub fn with_readiness(mut self, readiness: Vec<ReadinessStrategy>) -> Self {
        self.readiness = readiness;
        self
    }
}

/// Optional bounds on the blocking waits. `None` waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeouts {
    /// Budget for a server's readiness signals.
    pub readiness: Option<Duration>,
    /// Budget for draining output and joining a process.
    pub drain: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Idle,
    ServerStarting,
    ServerReady,
    ClientStarting,
    ClientRunning,
    Done(Outcome),
}

/// Runs pairs one at a time and owns the run's [`PidRegistry`].
///
/// Progress tokens (`starting server... ok`) and relayed client output go to `out`.
pub struct PairRunner<W: Write> {
    launcher: ProcessLauncher,
    registry: PidRegistry,
    timeouts: Timeouts,
    out: W,
    history: Vec<PairState>,
}

impl PairRunner<io::Stdout> {
    /// A runner writing to the harness's stdout.
    pub fn stdout(launcher: ProcessLauncher, timeouts: Timeouts) -> Self {
        Self::new(launcher, timeouts, io::stdout())
    }
}

impl<W: Write> PairRunner<W> {
    pub fn new(launcher: ProcessLauncher, timeouts: Timeouts, out: W) -> Self {
        Self {
            launcher,
            registry: PidRegistry::new(),
            timeouts,
            out,
            history: vec![PairState::Idle],
        }
    }

    pub fn registry(&self) -> &PidRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PidRegistry {
        &mut self.registry
    }

    /// Current state of the most recent pair.
    pub fn state(&self) -> PairState {
        self.history.last().copied().unwrap_or(PairState::Idle)
    }

    /// Every state the most recent pair passed through, starting at `Idle`.
    pub fn history(&self) -> &[PairState] {
        &self.history
    }

    /// The progress sink, for callers that interleave their own lines.
    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run a server, wait for it, run a client against it, relay the client's output and check both exit codes.
    pub fn run_pair(&mut self, server: &ServerSpec, client: &CommandSpec) -> Result<(), HarnessError> {
        let launcher = self.launcher.clone();
        launcher.block_on(self.pair(server, client))
    }

    /// Run a single process that hosts both client and server.
    pub fn run_collocated(&mut self, collocated: &ServerSpec) -> Result<(), HarnessError> {
        let launcher = self.launcher.clone();
        launcher.block_on(self.collocated(collocated))
    }

    /// Run one performance measurement: the client's entire stdout is a single floating point value.
    ///
    /// No progress tokens are printed; remaining server output is relayed after the client finishes.
    pub fn run_measurement(&mut self, server: &ServerSpec, client: &CommandSpec) -> Result<f64, HarnessError> {
        let launcher = self.launcher.clone();
        launcher.block_on(self.measurement(server, client))
    }

    async fn pair(&mut self, server: &ServerSpec, client: &CommandSpec) -> Result<(), HarnessError> {
        self.reset();
        let (mut server_handle, server_pids) = self.start_server("server", server, true).await?;

        self.transition(PairState::ClientStarting);
        self.announce("starting client...")?;
        let mut client_handle = match self.launcher.launch("client", client) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e, true),
        };
        self.announce_ok()?;
        self.transition(PairState::ClientRunning);

        let deadline = self.drain_deadline();
        if let Err(e) = relay("client", client_handle.stream(), &mut self.out, deadline).await {
            return self.fail(e, false);
        }

        let client_status = self.close(&mut client_handle).await?;
        if !client_status.success() {
            self.settle(&mut server_handle).await;
            self.check_exits(&[("client", client_status)])?;
        }
        let server_status = self.close(&mut server_handle).await?;
        self.forget(&server_handle, &server_pids);

        self.finish(&[("client", client_status), ("server", server_status)])
    }

    async fn collocated(&mut self, collocated: &ServerSpec) -> Result<(), HarnessError> {
        self.reset();
        let (mut handle, pids) = self.start_server("collocated", collocated, true).await?;
        self.transition(PairState::ClientRunning);

        let deadline = self.drain_deadline();
        if let Err(e) = relay("collocated", handle.stream(), &mut self.out, deadline).await {
            return self.fail(e, false);
        }

        let status = self.close(&mut handle).await?;
        self.forget(&handle, &pids);
        self.finish(&[("collocated", status)])
    }

    async fn measurement(&mut self, server: &ServerSpec, client: &CommandSpec) -> Result<f64, HarnessError> {
        self.reset();
        let (mut server_handle, server_pids) = self.start_server("server", server, false).await?;

        self.transition(PairState::ClientStarting);
        let mut client_handle = match self.launcher.launch("client", client) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e, false),
        };
        self.transition(PairState::ClientRunning);

        let output = match client_handle.stream().read_to_end(self.drain_deadline()).await {
            Ok(output) => output,
            Err(e) => return self.fail(e.into_harness("client", "result"), false),
        };
        let client_status = self.close(&mut client_handle).await?;
        if !client_status.success() {
            self.settle(&mut server_handle).await;
            self.check_exits(&[("client", client_status)])?;
        }

        let deadline = self.drain_deadline();
        if let Err(e) = relay("server", server_handle.stream(), &mut self.out, deadline).await {
            return self.fail(e, false);
        }
        let server_status = self.close(&mut server_handle).await?;
        self.forget(&server_handle, &server_pids);

        self.check_exits(&[("server", server_status)])?;

        let trimmed = output.trim();
        match trimmed.parse::<f64>() {
            Ok(value) => {
                self.transition(PairState::Done(Outcome::Pass));
                Ok(value)
            }
            Err(_) => self.fail(
                HarnessError::BadResult {
                    output: trimmed.to_string(),
                },
                false,
            ),
        }
    }

    async fn start_server(
        &mut self,
        role: &str,
        spec: &ServerSpec,
        announce: bool,
    ) -> Result<(ProcessHandle, Vec<u32>), HarnessError> {
        self.transition(PairState::ServerStarting);
        if announce {
            self.announce(&format!("starting {role}..."))?;
        }
        let mut handle = match self.launcher.launch(role, &spec.command) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e, announce),
        };
        let deadline = Deadline::after(self.timeouts.readiness);
        let awaited = await_readiness(role, handle.stream(), &spec.readiness, &mut self.registry, deadline).await;
        let pids = match awaited {
            Ok(pids) => pids,
            Err(e) => {
                handle.kill().await;
                return self.fail(e, announce);
            }
        };
        if announce {
            self.announce_ok()?;
        }
        self.transition(PairState::ServerReady);
        Ok((handle, pids))
    }

    async fn close(&mut self, handle: &mut ProcessHandle) -> Result<ExitStatus, HarnessError> {
        let closed = handle.close(self.drain_deadline()).await;
        closed.or_else(|e| self.fail(e, false))
    }

    /// After a client failure the server still gets its drain budget to exit on its own; the sweep that follows
    /// takes care of anything left.
    async fn settle(&mut self, server: &mut ProcessHandle) {
        match server.close(self.drain_deadline()).await {
            Ok(status) => tracing::debug!(%status, "server exited after client failure"),
            Err(e) => tracing::debug!("server did not exit after client failure: {}", e),
        }
    }

    /// A joined server is no longer a sweep candidate.
    fn forget(&mut self, handle: &ProcessHandle, pids: &[u32]) {
        self.registry.untrack(handle.pid());
        for pid in pids {
            self.registry.untrack(*pid);
        }
    }

    fn finish(&mut self, statuses: &[(&str, ExitStatus)]) -> Result<(), HarnessError> {
        self.check_exits(statuses)?;
        self.transition(PairState::Done(Outcome::Pass));
        Ok(())
    }

    fn check_exits(&mut self, statuses: &[(&str, ExitStatus)]) -> Result<(), HarnessError> {
        match statuses.iter().find(|(_, status)| !status.success()) {
            Some((role, status)) => self.fail(
                HarnessError::NonZeroExit {
                    role: role.to_string(),
                    status: status.to_string(),
                },
                false,
            ),
            None => Ok(()),
        }
    }

    /// Record the failure, print `failed!` if a phase was announced, and sweep tracked servers.
    fn fail<T>(&mut self, err: HarnessError, announced: bool) -> Result<T, HarnessError> {
        if announced {
            let _ = writeln!(self.out, "failed!");
            let _ = self.out.flush();
        }
        tracing::debug!(tracked = self.registry.len(), "pair failed: {}", err);
        self.registry.sweep();
        self.transition(PairState::Done(Outcome::Fail));
        Err(err)
    }

    fn announce(&mut self, phase: &str) -> Result<(), HarnessError> {
        write!(self.out, "{phase} ")?;
        self.out.flush()?;
        Ok(())
    }

    fn announce_ok(&mut self) -> Result<(), HarnessError> {
        writeln!(self.out, "ok")?;
        self.out.flush()?;
        Ok(())
    }

    fn drain_deadline(&self) -> Deadline {
        Deadline::after(self.timeouts.drain)
    }

    fn reset(&mut self) {
        self.history.clear();
        self.history.push(PairState::Idle);
    }

    fn transition(&mut self, next: PairState) {
        tracing::debug!(from = ?self.state(), to = ?next, "pair state");
        self.history.push(next);
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    fn launcher() -> ProcessLauncher {
        ProcessLauncher::new(crate::harness::Interrupt::new()).unwrap()
    }

    fn runner() -> PairRunner<Vec<u8>> {
        PairRunner::new(launcher(), Timeouts::default(), Vec::new())
    }

    fn output(runner: PairRunner<Vec<u8>>) -> String {
        String::from_utf8(runner.into_output()).unwrap()
    }

    #[test]
    fn test_pass_walks_every_state() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready"));
        runner.run_pair(&server, &sh("echo hello")).unwrap();

        assert_eq!(
            runner.history(),
            &[
                PairState::Idle,
                PairState::ServerStarting,
                PairState::ServerReady,
                PairState::ClientStarting,
                PairState::ClientRunning,
                PairState::Done(Outcome::Pass),
            ]
        );
        assert_eq!(
            output(runner),
            "starting server... ok\nstarting client... ok\nhello\n"
        );
    }

    #[test]
    fn test_server_without_output_fails_at_readiness() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("exit 0"));
        let err = runner.run_pair(&server, &sh("echo never")).unwrap_err();

        assert!(matches!(err, HarnessError::NotReady { .. }));
        assert_eq!(runner.state(), PairState::Done(Outcome::Fail));
        assert!(!runner.history().contains(&PairState::ClientStarting));
        assert_eq!(output(runner), "starting server... failed!\n");
    }

    #[test]
    fn test_client_failure_fails_pair() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready"));
        let err = runner.run_pair(&server, &sh("echo partial; exit 1")).unwrap_err();
        assert!(matches!(err, HarnessError::NonZeroExit { ref role, .. } if role == "client"));
        assert_eq!(runner.state(), PairState::Done(Outcome::Fail));
    }

    #[test]
    fn test_client_failure_still_waits_for_server_exit() {
        let marker = std::env::temp_dir().join(format!("pairtest_pair_settle_{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let server = ServerSpec::new(sh(&format!("echo adapter ready; sleep 0.3; touch {}", marker.display())));

        let mut runner = runner();
        let err = runner.run_pair(&server, &sh("exit 1")).unwrap_err();

        assert!(matches!(err, HarnessError::NonZeroExit { ref role, .. } if role == "client"));
        assert!(marker.exists());
        assert!(runner.registry().is_empty());
    }

    #[test]
    fn test_measurement_client_failure_still_waits_for_server_exit() {
        let marker = std::env::temp_dir().join(format!("pairtest_measure_settle_{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let server = ServerSpec::new(sh(&format!("echo adapter ready; sleep 0.3; touch {}", marker.display())));

        let mut runner = runner();
        let err = runner.run_measurement(&server, &sh("echo 1.0; exit 1")).unwrap_err();

        assert!(matches!(err, HarnessError::NonZeroExit { ref role, .. } if role == "client"));
        assert!(marker.exists());
    }

    #[test]
    fn test_server_failure_fails_pair() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready; exit 2"));
        let err = runner.run_pair(&server, &sh("true")).unwrap_err();
        assert!(matches!(err, HarnessError::NonZeroExit { ref role, .. } if role == "server"));
    }

    #[test]
    fn test_missing_client_program_prints_failed() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready"));
        let err = runner
            .run_pair(&server, &CommandSpec::new("/nonexistent/pairtest-client"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Start { .. }));
        assert!(output(runner).ends_with("starting client... failed!\n"));
    }

    #[test]
    fn test_collocated_relays_and_passes() {
        let mut runner = runner();
        let collocated = ServerSpec::new(sh("echo testing collocated; echo done")).with_readiness(vec![]);
        runner.run_collocated(&collocated).unwrap();
        assert_eq!(
            output(runner),
            "starting collocated... ok\ntesting collocated\ndone\n"
        );
    }

    #[test]
    fn test_collocated_nonzero_exit_fails() {
        let mut runner = runner();
        let collocated = ServerSpec::new(sh("exit 1")).with_readiness(vec![]);
        assert!(runner.run_collocated(&collocated).is_err());
        assert_eq!(runner.state(), PairState::Done(Outcome::Fail));
    }

    #[test]
    fn test_measurement_parses_client_value() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready; echo server-note"));
        let value = runner.run_measurement(&server, &sh("echo ' 12.5 '")).unwrap();
        assert_eq!(value, 12.5);
        assert_eq!(output(runner), "server-note\n");
    }

    #[test]
    fn test_measurement_rejects_non_numeric_output() {
        let mut runner = runner();
        let server = ServerSpec::new(sh("echo adapter ready"));
        let err = runner.run_measurement(&server, &sh("echo fast")).unwrap_err();
        assert!(matches!(err, HarnessError::BadResult { ref output } if output == "fast"));
    }

    #[test]
    fn test_readiness_timeout_fails_hung_server() {
        let timeouts = Timeouts {
            readiness: Some(Duration::from_millis(200)),
            drain: None,
        };
        let mut runner = PairRunner::new(launcher(), timeouts, Vec::new());
        let server = ServerSpec::new(CommandSpec::new("sleep").arg("30"));
        let err = runner.run_pair(&server, &sh("true")).unwrap_err();
        assert!(matches!(err, HarnessError::TimedOut { .. }));
    }
}
