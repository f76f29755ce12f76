//! Test scripts and performance suites.
//!
//! Both are JSON documents. A test script (`*.pairtest.json`) lists the pair and collocated steps of one test
//! directory; a performance suite (`perf/<Product>.json`) lists the measured cases of one product.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pairtest_core::{CaseFilter, descriptor};

use crate::config::{ConfigError, HarnessConfig};
use crate::harness::{CommandSpec, ReadinessStrategy, ServerSpec, StderrMode, split_options};

/// Suffix identifying test scripts during discovery.
pub const SCRIPT_SUFFIX: &str = ".pairtest.json";

// ============================================================================
// Test scripts
// ============================================================================

/// One step of a test script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ClientServer { server: ServerSpec, client: CommandSpec },
    Collocated(CollocatedSpec),
}

/// A process hosting both client and server. Its whole output is relayed, so it awaits no readiness signal unless
/// the script lists one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollocatedSpec {
    #[serde(flatten)]
    pub command: CommandSpec,
    #[serde(default)]
    pub readiness: Vec<ReadinessStrategy>,
}

impl From<CollocatedSpec> for ServerSpec {
    fn from(collocated: CollocatedSpec) -> Self {
        ServerSpec::new(collocated.command).with_readiness(collocated.readiness)
    }
}

/// The steps of one test directory, run in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScript {
    #[serde(skip)]
    pub path: PathBuf,
    /// Display name, defaulting to the script's directory.
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

impl TestScript {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut script: TestScript = read_json(path)?;
        script.path = path.to_path_buf();
        Ok(script)
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(&self.path)
            .display()
            .to_string()
    }

    /// Resolve the script's commands: relative working directories are taken from the script's directory and the
    /// configured common options are appended to each role.
    pub fn resolve(&self, config: &HarnessConfig) -> Vec<Step> {
        let base = self.path.parent().unwrap_or(Path::new("."));
        self.steps
            .iter()
            .map(|step| match step {
                Step::ClientServer { server, client } => Step::ClientServer {
                    server: ServerSpec {
                        command: with_defaults(&server.command, base, config.server_args()),
                        readiness: server.readiness.clone(),
                    },
                    client: with_defaults(client, base, config.client_args()),
                },
                Step::Collocated(collocated) => Step::Collocated(CollocatedSpec {
                    command: with_defaults(&collocated.command, base, config.collocated_args()),
                    readiness: collocated.readiness.clone(),
                }),
            })
            .collect()
    }
}

fn with_defaults(command: &CommandSpec, base: &Path, extra: Vec<String>) -> CommandSpec {
    let cwd = match &command.cwd {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => base.join(dir),
        None => base.to_path_buf(),
    };
    let mut resolved = command.clone().args(extra);
    resolved.cwd = Some(cwd);
    resolved
}

/// Find test scripts under `path`, sorted. Hidden directories and `target` are skipped.
pub fn discover_scripts(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_script(path) {
            files.push(path.to_path_buf());
        }
    } else if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            let entry_path = entry.path();
            let name = entry_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if entry_path.is_dir() {
                if !name.starts_with('.') && name != "target" {
                    files.extend(discover_scripts(&entry_path));
                }
            } else if is_script(&entry_path) {
                files.push(entry_path);
            }
        }
    }

    files.sort();
    files
}

fn is_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(SCRIPT_SUFFIX))
}

// ============================================================================
// Performance suites
// ============================================================================

/// Product families with a performance suite, and the variable that enables each.
pub const PRODUCTS: [(&str, &str); 3] = [("IceTests", "ICE_HOME"), ("TAOTests", "TAO_ROOT"), ("IceETests", "ICEE_HOME")];

/// One measured case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfCase {
    pub name: String,
    #[serde(default)]
    pub client_options: String,
    #[serde(default)]
    pub server_options: String,
    /// Passed to the client as `--<name>=<value>`.
    #[serde(default)]
    pub extra_args: Vec<(String, String)>,
}

/// Cases sharing a directory under `src/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfGroup {
    pub product: String,
    pub name: String,
    pub directory: String,
    pub cases: Vec<PerfCase>,
}

/// Suite file layout: `{"groups": [...]}`.
#[derive(Debug, Clone, Deserialize)]
struct PerfSuiteFile {
    groups: Vec<PerfGroup>,
}

/// Load the groups of every product whose suite file exists and whose variable is set.
pub fn load_perf_groups(
    toplevel: &Path,
    is_set: impl Fn(&str) -> bool,
) -> Result<Vec<PerfGroup>, ConfigError> {
    let mut groups = Vec::new();
    for (product, var) in PRODUCTS {
        let path = toplevel.join("perf").join(format!("{product}.json"));
        if !path.is_file() || !is_set(var) {
            continue;
        }
        let suite: PerfSuiteFile = read_json(&path)?;
        tracing::debug!(product, groups = suite.groups.len(), "loaded performance suite");
        groups.extend(suite.groups);
    }
    Ok(groups)
}

/// Keep the cases whose descriptor matches `filter`; groups left empty are dropped.
pub fn filter_groups(groups: Vec<PerfGroup>, filter: &CaseFilter) -> Vec<PerfGroup> {
    groups
        .into_iter()
        .filter_map(|group| {
            let cases = filter
                .select(&group.cases, |case| descriptor(&group.product, &group.name, &case.name))
                .into_iter()
                .cloned()
                .collect::<Vec<_>>();
            (!cases.is_empty()).then_some(PerfGroup { cases, ..group })
        })
        .collect()
}

impl PerfGroup {
    pub fn descriptor(&self, case: &PerfCase) -> String {
        descriptor(&self.product, &self.name, &case.name)
    }

    /// Server and client commands for `case`, run from `<toplevel>/src/<group dir>`.
    ///
    /// The cases of a group share that directory's `server` and `client` and differ only in their options.
    pub fn commands(&self, toplevel: &Path, case: &PerfCase) -> (ServerSpec, CommandSpec) {
        let cwd = toplevel.join("src").join(&self.directory);
        let server = CommandSpec::new("./server")
            .args(split_options(&case.server_options))
            .current_dir(&cwd)
            .stderr(StderrMode::Discard);
        let client = CommandSpec::new("./client")
            .args(split_options(&case.client_options))
            .args(case.extra_args.iter().map(|(arg, value)| format!("--{arg}={value}")))
            .current_dir(&cwd)
            .stderr(StderrMode::Inherit);
        (
            ServerSpec::new(server).with_readiness(vec![ReadinessStrategy::AdapterReady]),
            client,
        )
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
