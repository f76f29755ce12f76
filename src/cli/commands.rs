//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io;
use std::path::{Path, PathBuf};

use pairtest_core::{AllResults, HostResults, RenderFormat};

use crate::config::{ConfigError, HarnessConfig, find_toplevel};
use crate::perf::{self, PerfOptions, TargetSystems};

use super::{CliError, CliResult, ExitCode, interruptible_launcher};

// ============================================================================
// perf
// ============================================================================

/// Run the performance suites and print the aggregated results.
pub fn perf(
    iterations: u32,
    output: Option<PathBuf>,
    hostname: Option<String>,
    csv: bool,
    patterns: Vec<String>,
) -> CliResult<ExitCode> {
    let toplevel = find_toplevel(Path::new(".")).map_err(CliError::diagnostic)?;
    let config = HarnessConfig::load_from_toplevel(&toplevel).map_err(CliError::diagnostic)?;

    let systems = match TargetSystems::detect(&toplevel, |var| std::env::var(var).ok()) {
        Ok(systems) => systems,
        Err(e @ ConfigError::NoTargetSystem) => {
            println!("{e}");
            return Err(CliError::failure(""));
        }
        Err(e) => return Err(CliError::diagnostic(e)),
    };

    let options = PerfOptions {
        iterations,
        output,
        hostname,
        patterns,
        timeouts: config.timeouts(),
    };
    let launcher = interruptible_launcher()?;

    let all = perf::run(&toplevel, &systems, &options, launcher, io::stdout()).map_err(CliError::diagnostic)?;
    print!("{}", perf::render_summary(&all, csv));
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// results
// ============================================================================

/// Print stored results files side by side.
pub fn print_results(files: &[PathBuf], csv: bool) -> CliResult<ExitCode> {
    let mut all = AllResults::new();
    for file in files {
        let results = HostResults::load(file).map_err(|e| CliError::failure(format!("Error: {e}")))?;
        all.add(results);
    }
    if all.is_empty() {
        return Err(CliError::failure("No results recorded"));
    }
    let format = if csv { RenderFormat::Csv } else { RenderFormat::Table };
    print!("{}", all.render(format));
    Ok(ExitCode::SUCCESS)
}
