//! Pass/fail transition classification between two result sets.
//!
//! Cases are matched by `test_case_id` only; question text is never used to
//! pair cases.

use super::aggregate::{case_all_passed, case_metric_scores};
use super::delta::{DeltaRow, compute_deltas};
use crate::model::TestCaseResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How a test case changed from the base run to the target run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Only in the target run.
    New,
    /// Only in the base run.
    Removed,
    /// Passed everything in base, not in target.
    Regression,
    /// Failed something in base, passes everything in target.
    Improvement,
    SamePass,
    SameFail,
}

impl CaseStatus {
    /// All statuses, in report order.
    pub const ALL: [CaseStatus; 6] = [
        CaseStatus::Regression,
        CaseStatus::Improvement,
        CaseStatus::New,
        CaseStatus::Removed,
        CaseStatus::SameFail,
        CaseStatus::SamePass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::New => "new",
            CaseStatus::Removed => "removed",
            CaseStatus::Regression => "regression",
            CaseStatus::Improvement => "improvement",
            CaseStatus::SamePass => "same_pass",
            CaseStatus::SameFail => "same_fail",
        }
    }

    /// Parse from the snake_case name.
    pub fn parse(s: &str) -> Option<Self> {
        CaseStatus::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one matched pair. Returns `None` when both sides are absent.
pub fn classify(base: Option<&TestCaseResult>, target: Option<&TestCaseResult>) -> Option<CaseStatus> {
    let status = match (base, target) {
        (None, None) => return None,
        (None, Some(_)) => CaseStatus::New,
        (Some(_), None) => CaseStatus::Removed,
        (Some(b), Some(t)) => match (case_all_passed(b), case_all_passed(t)) {
            (true, true) => CaseStatus::SamePass,
            (true, false) => CaseStatus::Regression,
            (false, true) => CaseStatus::Improvement,
            (false, false) => CaseStatus::SameFail,
        },
    };
    Some(status)
}

/// One classified case with its per-metric score changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseTransition {
    pub test_case_id: String,
    pub status: CaseStatus,
    /// Question text from whichever side has the case (base preferred).
    pub question: String,
    /// Normalized per-metric deltas for this case.
    pub metric_deltas: Vec<DeltaRow>,
}

/// Count of cases per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCounts {
    pub new: usize,
    pub removed: usize,
    pub regression: usize,
    pub improvement: usize,
    pub same_pass: usize,
    pub same_fail: usize,
    pub total: usize,
}

impl TransitionCounts {
    /// Tally a list of transitions.
    pub fn from_transitions(transitions: &[CaseTransition]) -> Self {
        let mut counts = Self::default();
        for t in transitions {
            counts.record(t.status);
        }
        counts
    }

    fn record(&mut self, status: CaseStatus) {
        match status {
            CaseStatus::New => self.new += 1,
            CaseStatus::Removed => self.removed += 1,
            CaseStatus::Regression => self.regression += 1,
            CaseStatus::Improvement => self.improvement += 1,
            CaseStatus::SamePass => self.same_pass += 1,
            CaseStatus::SameFail => self.same_fail += 1,
        }
        self.total += 1;
    }

    /// Count for a single status.
    pub fn get(&self, status: CaseStatus) -> usize {
        match status {
            CaseStatus::New => self.new,
            CaseStatus::Removed => self.removed,
            CaseStatus::Regression => self.regression,
            CaseStatus::Improvement => self.improvement,
            CaseStatus::SamePass => self.same_pass,
            CaseStatus::SameFail => self.same_fail,
        }
    }
}

/// Classify every case present in either set.
///
/// Output order: base cases in base order, then target-only cases in target
/// order. When an id repeats within one set, its first occurrence is used.
pub fn compare_cases(base: &[TestCaseResult], target: &[TestCaseResult]) -> Vec<CaseTransition> {
    let base_by_id = index_by_id(base);
    let target_by_id = index_by_id(target);

    let mut seen: HashSet<&str> = HashSet::with_capacity(base_by_id.len() + target_by_id.len());
    let order: Vec<&str> = base
        .iter()
        .chain(target.iter())
        .map(|case| case.test_case_id.as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    order
        .into_iter()
        .filter_map(|id| {
            let b = base_by_id.get(id).copied();
            let t = target_by_id.get(id).copied();
            let status = classify(b, t)?;

            let scores_a = b.map(case_metric_scores).unwrap_or_default();
            let scores_b = t.map(case_metric_scores).unwrap_or_default();
            let question = b
                .or(t)
                .map(|c| c.question.clone())
                .unwrap_or_default();

            Some(CaseTransition {
                test_case_id: id.to_string(),
                status,
                question,
                metric_deltas: compute_deltas(&scores_a, &scores_b),
            })
        })
        .collect()
}

fn index_by_id(results: &[TestCaseResult]) -> HashMap<&str, &TestCaseResult> {
    let mut map = HashMap::with_capacity(results.len());
    for r in results {
        map.entry(r.test_case_id.as_str()).or_insert(r);
    }
    map
}
