//! Harness configuration
//!
//! Layered as built-in defaults, then `config/pairtest.json` under the toplevel directory, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::harness::{Timeouts, split_options};

/// Location of the config file relative to the toplevel directory.
pub const CONFIG_FILE: &str = "config/pairtest.json";

/// How many parent directories toplevel discovery climbs.
const TOPLEVEL_SEARCH_DEPTH: usize = 4;

const DEFAULT_CLIENT_OPTIONS: &str = "--Ice.NullHandleAbort --Ice.Warn.Connections";
const DEFAULT_SERVER_OPTIONS: &str = "--Ice.PrintAdapterReady --Ice.NullHandleAbort --Ice.Warn.Connections \
     --Ice.ServerIdleTime=30 --Ice.ThreadPool.Server.Size=1 --Ice.ThreadPool.Server.SizeMax=3 \
     --Ice.ThreadPool.Server.SizeWarn=0";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("You need to set at least ICE_HOME, ICEE_HOME or TAO_ROOT!")]
    #[diagnostic(code(pairtest::no_target))]
    NoTargetSystem,

    #[error("can't find toplevel directory (no {} in . or up to {} parents)", CONFIG_FILE, TOPLEVEL_SEARCH_DEPTH)]
    #[diagnostic(code(pairtest::no_toplevel))]
    NoToplevel,

    #[error("failed to read {}: {source}", .path.display())]
    #[diagnostic(code(pairtest::config_read))]
    Read { path: PathBuf, source: std::io::Error },

    #[error("malformed {}: {source}", .path.display())]
    #[diagnostic(code(pairtest::config_parse))]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error(transparent)]
    #[diagnostic(code(pairtest::filter))]
    Filter(#[from] pairtest_core::FilterError),
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Host clients and servers bind and connect to
    pub host: String,
    /// Options appended to every client command
    pub client_options: String,
    /// Options appended to every server command
    pub server_options: String,
    /// Options appended to every collocated command
    pub collocated_options: String,
    /// Budget for a server's readiness signals, unbounded when absent
    pub readiness_timeout_secs: Option<u64>,
    /// Budget for draining and joining a process, unbounded when absent
    pub drain_timeout_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            client_options: DEFAULT_CLIENT_OPTIONS.to_string(),
            server_options: DEFAULT_SERVER_OPTIONS.to_string(),
            collocated_options: String::new(),
            readiness_timeout_secs: None,
            drain_timeout_secs: None,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path`, falling back to defaults for every missing field.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded harness config");
        Ok(config)
    }

    /// Load the config file under `toplevel` if there is one.
    pub fn load_from_toplevel(toplevel: &Path) -> Result<Self, ConfigError> {
        let path = toplevel.join(CONFIG_FILE);
        if path.is_file() { Self::load(&path) } else { Ok(Self::default()) }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_readiness_timeout(mut self, secs: Option<u64>) -> Self {
        self.readiness_timeout_secs = secs;
        self
    }

    pub fn with_drain_timeout(mut self, secs: Option<u64>) -> Self {
        self.drain_timeout_secs = secs;
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            readiness: self.readiness_timeout_secs.map(Duration::from_secs),
            drain: self.drain_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn client_args(&self) -> Vec<String> {
        self.with_host_arg(&self.client_options)
    }

    pub fn server_args(&self) -> Vec<String> {
        self.with_host_arg(&self.server_options)
    }

    pub fn collocated_args(&self) -> Vec<String> {
        self.with_host_arg(&self.collocated_options)
    }

    fn with_host_arg(&self, options: &str) -> Vec<String> {
        let mut args = Vec::new();
        if !self.host.is_empty() {
            args.push(format!("--Ice.Default.Host={}", self.host));
        }
        args.extend(split_options(options));
        args
    }
}

/// The first of `start` and its parents (up to four levels) that contains [`CONFIG_FILE`].
pub fn find_toplevel(start: &Path) -> Result<PathBuf, ConfigError> {
    start
        .ancestors()
        .take(TOPLEVEL_SEARCH_DEPTH + 1)
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
        .ok_or(ConfigError::NoToplevel)
}
