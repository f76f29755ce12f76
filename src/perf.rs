//! Performance driver.
//!
//! Runs every selected case of the enabled product suites `iterations` times, recording each client's value in a
//! per-host results file as it arrives. An operator interrupt ends the iteration loop early; whatever has been
//! recorded is kept and summarized.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use pairtest_core::{AllResults, CaseFilter, HostResults, RenderFormat, ResultsError};

use crate::config::ConfigError;
use crate::harness::{HarnessError, PairRunner, ProcessLauncher, Timeouts};
use crate::suite::{self, PRODUCTS, PerfGroup};

#[derive(Debug, Error, Diagnostic)]
pub enum PerfError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    #[diagnostic(code(pairtest::results))]
    Results(#[from] ResultsError),
}

/// Options of one performance run.
#[derive(Debug, Clone, Default)]
pub struct PerfOptions {
    pub iterations: u32,
    pub output: Option<PathBuf>,
    pub hostname: Option<String>,
    pub patterns: Vec<String>,
    pub timeouts: Timeouts,
}

/// The target-system variables in effect for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSystems {
    vars: BTreeMap<String, String>,
    /// Variables the harness filled in itself; children get them as environment overrides.
    defaulted: BTreeMap<String, String>,
}

impl TargetSystems {
    /// Collect `ICE_HOME`, `TAO_ROOT` and `ICEE_HOME` through `lookup`.
    ///
    /// An unset `ICE_HOME` defaults to `<toplevel>/../ice` when that directory exists.
    pub fn detect(toplevel: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut systems = Self::default();
        for (_, var) in PRODUCTS {
            if let Some(value) = lookup(var) {
                systems.vars.insert(var.to_string(), value);
            }
        }
        if !systems.vars.contains_key("ICE_HOME") {
            let sibling = toplevel.join("..").join("ice");
            if sibling.is_dir() {
                let value = sibling.display().to_string();
                tracing::info!(ICE_HOME = %value, "defaulting ICE_HOME");
                systems.vars.insert("ICE_HOME".to_string(), value.clone());
                systems.defaulted.insert("ICE_HOME".to_string(), value);
            }
        }
        if systems.vars.is_empty() {
            return Err(ConfigError::NoTargetSystem);
        }
        Ok(systems)
    }

    pub fn is_set(&self, var: &str) -> bool {
        self.vars.contains_key(var)
    }

    pub fn defaulted(&self) -> &BTreeMap<String, String> {
        &self.defaulted
    }
}

/// Local hostname, cut at the first `.`.
pub fn local_hostname() -> String {
    let name = nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            tracing::warn!("cannot determine hostname: {}", e);
            String::from("localhost")
        });
    short_hostname(&name).to_string()
}

fn short_hostname(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// `results.ice.<os>.<host>`, lowercased.
pub fn default_output_name(os: &str, host: &str) -> String {
    format!("results.ice.{os}.{host}").to_lowercase()
}

/// Load, filter and run the selected cases; returns the aggregated results for rendering.
///
/// Per-case progress (`<descriptor>... <value>`) and remaining server output are written to `out`.
pub fn run<W: Write>(
    toplevel: &Path,
    systems: &TargetSystems,
    options: &PerfOptions,
    launcher: ProcessLauncher,
    out: W,
) -> Result<AllResults, PerfError> {
    let filter = CaseFilter::new(&options.patterns).map_err(ConfigError::from)?;
    let groups = suite::load_perf_groups(toplevel, |var| systems.is_set(var))?;
    let groups = suite::filter_groups(groups, &filter);
    if groups.is_empty() {
        tracing::warn!("no performance cases selected");
    }

    let host = options.hostname.clone().unwrap_or_else(local_hostname);
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_output_name(std::env::consts::OS, &host)));
    let mut results = HostResults::open(host, &output)?;

    let interrupt = launcher.interrupt().clone();
    let mut runner = PairRunner::new(launcher, options.timeouts, out);

    'iterations: for iteration in 1..=options.iterations {
        tracing::info!(iteration, "starting iteration");
        for group in &groups {
            for case in &group.cases {
                if interrupt.is_triggered() {
                    break 'iterations;
                }
                let outcome = run_case(&mut runner, toplevel, systems, group, case, &mut results);
                if let Flow::Stop = settle_case(outcome, interrupt.is_triggered())? {
                    break 'iterations;
                }
            }
        }
    }

    let mut all = AllResults::new();
    all.add(results);
    Ok(all)
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// An interrupted case ends the loop. Ctrl-C also reaches the children, so once the operator has interrupted any
/// failure ends the loop too. Other failures abort the run.
fn settle_case(outcome: Result<(), PerfError>, interrupted: bool) -> Result<Flow, PerfError> {
    match outcome {
        Ok(()) => Ok(Flow::Continue),
        Err(PerfError::Harness(e)) if e.is_interrupt() => Ok(Flow::Stop),
        Err(e) if interrupted => {
            tracing::debug!("case failed after an interrupt: {}", e);
            Ok(Flow::Stop)
        }
        Err(e) => Err(e),
    }
}

fn run_case<W: Write>(
    runner: &mut PairRunner<W>,
    toplevel: &Path,
    systems: &TargetSystems,
    group: &PerfGroup,
    case: &suite::PerfCase,
    results: &mut HostResults,
) -> Result<(), PerfError> {
    let test = group.descriptor(case);
    let (mut server, mut client) = group.commands(toplevel, case);
    for (var, value) in systems.defaulted() {
        server.command = server.command.env(var, value);
        client = client.env(var, value);
    }

    print_progress(runner, format_args!("{test}... "));
    match runner.run_measurement(&server, &client) {
        Ok(value) => {
            print_progress(runner, format_args!("{value:.3}\n"));
            results.record(test, value)?;
            Ok(())
        }
        Err(e) => {
            print_progress(runner, format_args!("failed!\n"));
            Err(e.into())
        }
    }
}

fn print_progress<W: Write>(runner: &mut PairRunner<W>, args: std::fmt::Arguments<'_>) {
    let out = runner.output_mut();
    let _ = out.write_fmt(args);
    let _ = out.flush();
}

/// Render `all` the way the perf command prints it.
pub fn render_summary(all: &AllResults, csv: bool) -> String {
    let mut text = String::from("\n\nAll results:\n");
    text.push_str(&all.render(RenderFormat::Table));
    if csv {
        text.push('\n');
        text.push_str(&all.render(RenderFormat::Csv));
    }
    text
}
