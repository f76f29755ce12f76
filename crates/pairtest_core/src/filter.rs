//! Case selection by regular expression.
//!
//! Every performance case is described by the string `"product group case"`. A filter holds zero or more
//! patterns; a case runs when at least one pattern matches at the start of its descriptor. With no patterns every
//! case runs. Cases that match nothing are skipped silently.

use regex::Regex;

use crate::errors::FilterError;

/// Compose the descriptor that filter patterns are matched against.
pub fn descriptor(product: &str, group: &str, case: &str) -> String {
    format!("{product} {group} {case}")
}

/// A set of case-name patterns.
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    patterns: Vec<Regex>,
}

impl CaseFilter {
    /// Compile `patterns`. An empty iterator yields a filter that keeps everything.
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let pattern = p.as_ref();
                Regex::new(pattern).map_err(|source| FilterError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// A filter that keeps every case.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the case with this descriptor should run.
    ///
    /// Patterns are anchored at the start of the descriptor, so `IceTests latency` selects every case of that group.
    pub fn matches(&self, descriptor: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns
            .iter()
            .any(|re| re.find(descriptor).is_some_and(|m| m.start() == 0))
    }

    /// Keep the items whose descriptor matches, preserving order.
    pub fn select<'a, T, F>(&self, items: &'a [T], describe: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> String,
    {
        items.iter().filter(|item| self.matches(&describe(item))).collect()
    }
}
