//! Recorded samples, per host and across hosts.
//!
//! A [`HostResults`] is the sample set of one host. It is backed by a JSON results file; opening it reloads the
//! samples of earlier runs and every [`HostResults::record`] rewrites the file, so repeated unattended runs grow
//! the sample instead of resetting it and an interrupted run keeps what it measured.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ResultsError;
use crate::render::{self, RenderFormat};
use crate::stats::Summary;

/// One measured value of one test for one iteration on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub host: String,
    pub test: String,
    /// 1-based position of the value within the test's samples.
    pub iteration: usize,
    pub value: f64,
}

/// Samples of one host, keyed by test descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResults {
    pub host: String,
    #[serde(default)]
    pub results: BTreeMap<String, Vec<f64>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl HostResults {
    /// In-memory results that are never persisted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            results: BTreeMap::new(),
            path: None,
        }
    }

    /// Open the results file for `host` at `path`, merging in any samples it already holds.
    ///
    /// A missing file is not an error; it is created on the first [`record`](Self::record).
    pub fn open(host: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ResultsError> {
        let host = host.into();
        let path = path.as_ref().to_path_buf();

        let mut results = Self::new(host);
        if path.exists() {
            let stored = Self::load(&path)?;
            if stored.host != results.host {
                tracing::warn!(
                    file = %path.display(),
                    stored = %stored.host,
                    requested = %results.host,
                    "results file belongs to another host; appending anyway"
                );
            }
            results.merge(stored);
        }
        results.path = Some(path);
        Ok(results)
    }

    /// Load a results file without attaching it for writing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResultsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ResultsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ResultsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one sample for `test` and persist.
    pub fn record(&mut self, test: impl Into<String>, value: f64) -> Result<(), ResultsError> {
        let test = test.into();
        tracing::debug!(host = %self.host, %test, value, "recording result");
        self.results.entry(test).or_default().push(value);
        self.save()
    }

    /// Append every sample of `other`, in order, after the samples already held.
    pub fn merge(&mut self, other: HostResults) {
        for (test, values) in other.results {
            self.results.entry(test).or_default().extend(values);
        }
    }

    /// Write the results to the backing file. No-op for in-memory results.
    pub fn save(&self) -> Result<(), ResultsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ResultsError::Write {
            path: path.clone(),
            source,
        })
    }

    /// Every sample as a flat list of records, ordered by test then iteration.
    pub fn records(&self) -> Vec<ResultRecord> {
        self.results
            .iter()
            .flat_map(|(test, values)| {
                values.iter().enumerate().map(|(i, value)| ResultRecord {
                    host: self.host.clone(),
                    test: test.clone(),
                    iteration: i + 1,
                    value: *value,
                })
            })
            .collect()
    }

    /// Per-test summaries; tests without samples are omitted.
    pub fn summaries(&self) -> BTreeMap<String, Summary> {
        self.results
            .iter()
            .filter_map(|(test, values)| Summary::of(values).map(|s| (test.clone(), s)))
            .collect()
    }
}

/// Results of several hosts, rendered side by side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllResults {
    hosts: BTreeMap<String, HostResults>,
}

impl AllResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host's results; samples for a host already present are appended.
    pub fn add(&mut self, results: HostResults) {
        match self.hosts.get_mut(&results.host) {
            Some(existing) => existing.merge(results),
            None => {
                self.hosts.insert(results.host.clone(), results);
            }
        }
    }

    /// Append one in-memory sample.
    pub fn record(&mut self, host: &str, test: impl Into<String>, value: f64) {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| HostResults::new(host))
            .results
            .entry(test.into())
            .or_default()
            .push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.values().all(|h| h.results.values().all(Vec::is_empty))
    }

    /// Host names in display order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// Every test name recorded on any host, sorted.
    pub fn tests(&self) -> Vec<&str> {
        let mut tests: Vec<&str> = self
            .hosts
            .values()
            .flat_map(|h| h.results.keys().map(String::as_str))
            .collect();
        tests.sort_unstable();
        tests.dedup();
        tests
    }

    /// Summary for one (test, host) pair.
    pub fn summary(&self, test: &str, host: &str) -> Option<Summary> {
        self.hosts
            .get(host)
            .and_then(|h| h.results.get(test))
            .and_then(|values| Summary::of(values))
    }

    /// Format the summaries as text.
    pub fn render(&self, format: RenderFormat) -> String {
        render::render(self, format)
    }
}
