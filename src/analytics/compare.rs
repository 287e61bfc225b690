//! Pairwise comparisons of runs and of saved analyses.
//!
//! Both functions are pure: fetch both operands first, then call these.

use super::aggregate::metric_averages;
use super::delta::{DeltaRow, compute_deltas, to_table};
use super::extract::extract_numerics;
use super::priority::{PriorityComparison, diff_priority_inputs, find_priority_summary};
use super::transition::{CaseStatus, CaseTransition, TransitionCounts, compare_cases};
use crate::model::{AnalysisResult, RunDetails, RunSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Everything the run-vs-run view shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub run_a: String,
    pub run_b: String,
    pub pass_rate_a: f64,
    pub pass_rate_b: f64,
    pub pass_rate_delta: f64,
    /// Run-level metric averages, A vs B.
    pub metric_deltas: Vec<DeltaRow>,
    /// Per-metric thresholds, A vs B.
    pub threshold_deltas: Vec<DeltaRow>,
    pub threshold_profile_changed: bool,
    pub transitions: Vec<CaseTransition>,
    pub counts: TransitionCounts,
}

impl RunComparison {
    /// Transitions with the given status, in comparison order.
    pub fn cases_with_status(&self, status: CaseStatus) -> impl Iterator<Item = &CaseTransition> {
        self.transitions.iter().filter(move |t| t.status == status)
    }
}

fn thresholds_table(summary: &RunSummary) -> Vec<(String, f64)> {
    summary
        .thresholds
        .as_ref()
        .map(|t| to_table(t.iter()))
        .unwrap_or_default()
}

/// Compare run A (base) to run B (target).
pub fn compare_runs(a: &RunDetails, b: &RunDetails) -> RunComparison {
    let transitions = compare_cases(&a.results, &b.results);
    let counts = TransitionCounts::from_transitions(&transitions);

    RunComparison {
        run_a: a.summary.run_id.clone(),
        run_b: b.summary.run_id.clone(),
        pass_rate_a: a.summary.pass_rate,
        pass_rate_b: b.summary.pass_rate,
        pass_rate_delta: b.summary.pass_rate - a.summary.pass_rate,
        metric_deltas: compute_deltas(&metric_averages(&a.results), &metric_averages(&b.results)),
        threshold_deltas: compute_deltas(&thresholds_table(&a.summary), &thresholds_table(&b.summary)),
        threshold_profile_changed: a.summary.threshold_profile != b.summary.threshold_profile,
        transitions,
        counts,
    }
}

/// Status of one pipeline node on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatusChange {
    pub node_id: String,
    pub status_a: Option<String>,
    pub status_b: Option<String>,
    pub changed: bool,
}

/// Everything the analysis-vs-analysis view shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisComparison {
    pub result_a: String,
    pub result_b: String,
    /// Numeric leaves of both final outputs.
    pub metric_deltas: Vec<DeltaRow>,
    pub node_changes: Vec<NodeStatusChange>,
    pub priority: PriorityComparison,
}

/// Compare two saved analyses.
pub fn compare_analyses(a: &AnalysisResult, b: &AnalysisResult) -> AnalysisComparison {
    let mut seen = HashSet::new();
    let node_changes = a
        .node_results
        .keys()
        .chain(b.node_results.keys())
        .filter(|id| seen.insert(*id))
        .map(|id| {
            let status_a = a.node_results.get(id).map(|n| n.status.clone());
            let status_b = b.node_results.get(id).map(|n| n.status.clone());
            NodeStatusChange {
                node_id: id.clone(),
                changed: status_a != status_b,
                status_a,
                status_b,
            }
        })
        .collect();

    AnalysisComparison {
        result_a: a.result_id.clone(),
        result_b: b.result_id.clone(),
        metric_deltas: compute_deltas(
            &extract_numerics(&a.final_output),
            &extract_numerics(&b.final_output),
        ),
        node_changes,
        priority: diff_priority_inputs(&find_priority_summary(a), &find_priority_summary(b)),
    }
}
