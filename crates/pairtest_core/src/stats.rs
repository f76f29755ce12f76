//! Summary statistics over the samples recorded for one test on one host.

/// A statistic that can be read off a [`Summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    /// Arithmetic mean of all samples.
    Mean,
    /// Best (lowest) sample; timings are "lower is better".
    Best,
}

/// Aggregate of a non-empty sequence of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub best: f64,
}

impl Summary {
    /// Summarize `values`.
    ///
    /// ## Returns
    /// - `None` when `values` is empty, otherwise the count, mean and minimum.
    pub fn of(values: &[f64]) -> Option<Self> {
        let best = best(values)?;
        let mean = mean(values)?;
        Some(Self {
            count: values.len(),
            mean,
            best,
        })
    }

    /// Read one statistic from the summary.
    pub fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Mean => self.mean,
            Statistic::Best => self.best,
        }
    }
}

/// Arithmetic mean, `None` for no samples.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Minimum sample, `None` for no samples.
pub fn best(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}
