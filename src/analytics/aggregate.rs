//! Averages over normalized scores.
//!
//! An empty list averages to `0.0`. Several consumers (projection axes, run
//! summaries) need a total, always-numeric aggregate, so NaN is never
//! produced here.

use super::normalize::normalize_score;
use crate::model::TestCaseResult;

/// Arithmetic mean; `0.0` for an empty slice.
pub fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Mean normalized score of `metric_name` across all cases.
///
/// A case without the metric contributes nothing, not a zero.
pub fn average_per_metric(results: &[TestCaseResult], metric_name: &str) -> f64 {
    let scores: Vec<f64> = results
        .iter()
        .flat_map(|r| r.metrics.iter())
        .filter(|m| m.name == metric_name)
        .map(|m| normalize_score(m.score))
        .collect();
    average(&scores)
}

/// Mean normalized score across every metric of one case.
pub fn case_average(result: &TestCaseResult) -> f64 {
    let scores: Vec<f64> = result
        .metrics
        .iter()
        .map(|m| normalize_score(m.score))
        .collect();
    average(&scores)
}

/// Fraction of the case's metrics that passed; `0.0` when it has none.
pub fn case_pass_rate(result: &TestCaseResult) -> f64 {
    if result.metrics.is_empty() {
        return 0.0;
    }
    let passed = result.metrics.iter().filter(|m| m.passed).count();
    passed as f64 / result.metrics.len() as f64
}

/// Whether every metric passed. A case with no metrics passes vacuously.
pub fn case_all_passed(result: &TestCaseResult) -> bool {
    result.metrics.iter().all(|m| m.passed)
}

/// Average of each metric across the run, in order of first appearance.
pub fn metric_averages(results: &[TestCaseResult]) -> Vec<(String, f64)> {
    let mut names: Vec<&str> = Vec::new();
    for metric in results.iter().flat_map(|r| r.metrics.iter()) {
        if !names.contains(&metric.name.as_str()) {
            names.push(&metric.name);
        }
    }

    names
        .into_iter()
        .map(|name| (name.to_string(), average_per_metric(results, name)))
        .collect()
}

/// Normalized score of each metric of one case, in case order.
pub fn case_metric_scores(result: &TestCaseResult) -> Vec<(String, f64)> {
    result
        .metrics
        .iter()
        .map(|m| (m.name.clone(), normalize_score(m.score)))
        .collect()
}
