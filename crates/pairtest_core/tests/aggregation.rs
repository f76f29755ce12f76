//! Property-based tests for result aggregation and case filtering.

use pairtest_core::{AllResults, CaseFilter, HostResults, Statistic, descriptor};
use proptest::prelude::*;

fn sample_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1.0e6, 1..50)
}

proptest! {
    /// Property: recording N values then summarizing yields their average and their minimum
    #[test]
    fn summary_matches_average_and_minimum(values in sample_strategy()) {
        let mut results = HostResults::new("h1");
        for v in &values {
            results.record("case", *v).unwrap();
        }

        let summary = results.summaries()["case"];
        let expected_mean = values.iter().sum::<f64>() / values.len() as f64;
        let expected_best = values.iter().cloned().fold(f64::INFINITY, f64::min);

        prop_assert_eq!(summary.count, values.len());
        prop_assert!((summary.get(Statistic::Mean) - expected_mean).abs() <= 1e-9 * expected_mean.max(1.0));
        prop_assert_eq!(summary.get(Statistic::Best), expected_best);
    }

    /// Property: hosts never see each other's samples
    #[test]
    fn hosts_are_summarized_independently(a in sample_strategy(), b in sample_strategy()) {
        let mut all = AllResults::new();
        for v in &a {
            all.record("h1", "case", *v);
        }
        for v in &b {
            all.record("h2", "case", *v);
        }

        prop_assert_eq!(all.summary("case", "h1").unwrap().count, a.len());
        prop_assert_eq!(all.summary("case", "h2").unwrap().count, b.len());
    }

    /// Property: the selected subset is exactly the cases some pattern matches
    #[test]
    fn filter_selects_exactly_matching_cases(
        cases in prop::collection::vec("[a-c]{1,3}", 0..12),
        patterns in prop::collection::vec("[a-c]{1,2}", 0..3),
    ) {
        let prefixed: Vec<String> = patterns.iter().map(|p| format!("P G {p}")).collect();
        let filter = CaseFilter::new(&prefixed).unwrap();
        let selected = filter.select(&cases, |c| descriptor("P", "G", c));

        let expected: Vec<&String> = if patterns.is_empty() {
            cases.iter().collect()
        } else {
            cases
                .iter()
                .filter(|c| patterns.iter().any(|p| c.starts_with(p.as_str())))
                .collect()
        };
        prop_assert_eq!(selected, expected);
    }
}

#[test]
fn two_iterations_scenario() {
    let mut all = AllResults::new();
    all.record("h1", "X", 10.0);
    all.record("h1", "X", 20.0);

    let summary = all.summary("X", "h1").unwrap();
    assert_eq!(summary.get(Statistic::Mean), 15.0);
    assert_eq!(summary.get(Statistic::Best), 10.0);
}
