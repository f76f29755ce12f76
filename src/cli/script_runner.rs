//! Test script runner
//!
//! ## ScriptReporter Trait
//!
//! The runner uses a `ScriptReporter` trait to separate reporting from
//! execution. Pair progress (`starting server... ok`) and relayed client
//! output always go to stdout; the reporter only adds the per-script framing
//! and the final summary.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{HarnessConfig, find_toplevel};
use crate::harness::{HarnessError, PairRunner, ProcessLauncher, ServerSpec};
use crate::suite::{Step, TestScript, discover_scripts};

use super::{CliError, CliResult, ExitCode, interruptible_launcher};

// ============================================================================
// Script Reporter Trait
// ============================================================================

/// Trait for reporting script execution results.
pub trait ScriptReporter {
    /// Called once the scripts to run are known
    fn on_collection_complete(&mut self, script_count: usize);

    /// Called before the first step of a script
    fn on_script_start(&mut self, script: &TestScript);

    /// Called when a script completes
    fn on_script_complete(&mut self, script: &TestScript, result: &ScriptResult);

    /// Called when the run ends, after the last script or the first failure
    fn on_run_complete(&mut self, summary: &RunSummary);
}

/// Result of running one script
#[derive(Debug)]
pub enum ScriptResult {
    Passed(Duration),
    Failed(Duration, String),
}

/// Summary of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Default console reporter
#[derive(Default)]
pub struct ConsoleReporter {
    pub verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ScriptReporter for ConsoleReporter {
    fn on_collection_complete(&mut self, script_count: usize) {
        if self.verbose {
            eprintln!("collected {} script(s)", script_count);
        }
    }

    fn on_script_start(&mut self, script: &TestScript) {
        println!("*** running tests in {}", script.display_name());
    }

    fn on_script_complete(&mut self, script: &TestScript, result: &ScriptResult) {
        match result {
            ScriptResult::Passed(d) => {
                if self.verbose {
                    eprintln!("\x1b[32mPASSED\x1b[0m {} ({:.0}ms)", script.display_name(), d.as_millis());
                }
            }
            ScriptResult::Failed(_, error) => {
                eprintln!("\x1b[31mFAILED\x1b[0m {}", script.display_name());
                eprintln!("{}", error);
            }
        }
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        let mut parts = Vec::new();
        if summary.passed > 0 {
            parts.push(format!("\x1b[32m{} passed\x1b[0m", summary.passed));
        }
        if summary.failed > 0 {
            parts.push(format!("\x1b[31m{} failed\x1b[0m", summary.failed));
        }
        let skipped = summary.total - summary.passed - summary.failed;
        if skipped > 0 {
            parts.push(format!("\x1b[33m{} not run\x1b[0m", skipped));
        }

        eprintln!();
        eprintln!(
            "====== {} in {:.2}s ======",
            parts.join(", "),
            summary.duration.as_secs_f64()
        );
    }
}

// ============================================================================
// Running scripts
// ============================================================================

/// Command-line overrides for `pairtest run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub host: Option<String>,
    pub readiness_timeout: Option<u64>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Resolve the harness config: defaults, then the config file, then flags.
pub fn resolve_config(path: &Path, options: &RunOptions) -> CliResult<HarnessConfig> {
    let mut config = match &options.config {
        Some(file) => HarnessConfig::load(file).map_err(CliError::diagnostic)?,
        None => match find_toplevel(path) {
            Ok(toplevel) => HarnessConfig::load_from_toplevel(&toplevel).map_err(CliError::diagnostic)?,
            Err(_) => HarnessConfig::default(),
        },
    };
    if let Some(host) = &options.host {
        config = config.with_host(host.clone());
    }
    if options.readiness_timeout.is_some() {
        config = config.with_readiness_timeout(options.readiness_timeout);
    }
    Ok(config)
}

/// Run every script under `path`, stopping at the first failure.
pub fn run_scripts(path: &Path, options: &RunOptions) -> CliResult<ExitCode> {
    let scripts = discover_scripts(path);
    if scripts.is_empty() {
        return Err(CliError::failure(format!(
            "No test scripts found in '{}'\nTest scripts should be named *.pairtest.json",
            path.display()
        )));
    }

    let config = resolve_config(path, options)?;
    let launcher = interruptible_launcher()?;
    let mut reporter = ConsoleReporter::new(options.verbose);

    let summary = run_with_reporter(&scripts, &config, launcher, &mut reporter)?;
    if summary.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Run `scripts` in order with `reporter`.
pub fn run_with_reporter<R: ScriptReporter>(
    scripts: &[PathBuf],
    config: &HarnessConfig,
    launcher: ProcessLauncher,
    reporter: &mut R,
) -> CliResult<RunSummary> {
    let start_time = Instant::now();
    let mut summary = RunSummary {
        total: scripts.len(),
        ..RunSummary::default()
    };
    reporter.on_collection_complete(scripts.len());

    let mut runner = PairRunner::stdout(launcher, config.timeouts());

    for path in scripts {
        let script = TestScript::load(path).map_err(CliError::diagnostic)?;
        reporter.on_script_start(&script);

        let started = Instant::now();
        let result = match run_script(&mut runner, &script, config) {
            Ok(()) => ScriptResult::Passed(started.elapsed()),
            Err(e) => ScriptResult::Failed(started.elapsed(), format!("{:?}", miette::Report::new(e))),
        };
        reporter.on_script_complete(&script, &result);

        match result {
            ScriptResult::Passed(_) => summary.passed += 1,
            ScriptResult::Failed(..) => {
                summary.failed += 1;
                break;
            }
        }
    }

    summary.duration = start_time.elapsed();
    reporter.on_run_complete(&summary);
    Ok(summary)
}

fn run_script<W: std::io::Write>(
    runner: &mut PairRunner<W>,
    script: &TestScript,
    config: &HarnessConfig,
) -> Result<(), HarnessError> {
    for step in script.resolve(config) {
        match step {
            Step::ClientServer { server, client } => runner.run_pair(&server, &client)?,
            Step::Collocated(collocated) => runner.run_collocated(&ServerSpec::from(collocated))?,
        }
    }
    Ok(())
}
