//! Priority-set differ.
//!
//! A priority summary is produced by an external pipeline node and arrives
//! as untyped JSON. [`parse_priority_summary`] validates the shape once and
//! yields a [`PriorityInput`]; everything downstream matches on that variant
//! instead of probing properties.

use crate::model::{AnalysisResult, PriorityCase, PrioritySummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Node id conventionally used by the priority-summary pipeline step.
pub const PRIORITY_NODE_ID: &str = "priority_summary";

/// Outcome of the shape check on an arbitrary JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorityInput {
    Summary(PrioritySummary),
    NotPrioritySummary,
}

impl PriorityInput {
    pub fn as_summary(&self) -> Option<&PrioritySummary> {
        match self {
            PriorityInput::Summary(summary) => Some(summary),
            PriorityInput::NotPrioritySummary => None,
        }
    }
}

/// Validate a JSON value as a priority summary.
///
/// The value must be an object with `bottom_cases` and/or `impact_cases`
/// arrays. Case entries that are not objects are skipped; badly typed
/// fields inside a case fall back to their defaults.
pub fn parse_priority_summary(value: &Value) -> PriorityInput {
    let Some(obj) = value.as_object() else {
        return PriorityInput::NotPrioritySummary;
    };

    let bottom = obj.get("bottom_cases").and_then(Value::as_array);
    let impact = obj.get("impact_cases").and_then(Value::as_array);
    if bottom.is_none() && impact.is_none() {
        return PriorityInput::NotPrioritySummary;
    }

    PriorityInput::Summary(PrioritySummary {
        bottom_cases: bottom.map(|cases| parse_cases(cases)).unwrap_or_default(),
        impact_cases: impact.map(|cases| parse_cases(cases)).unwrap_or_default(),
        bottom_percentile: obj.get("bottom_percentile").and_then(Value::as_f64),
        total_cases: obj
            .get("total_cases")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
    })
}

fn parse_cases(values: &[Value]) -> Vec<PriorityCase> {
    values
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| match serde_json::from_value::<PriorityCase>(v.clone()) {
            Ok(case) => Some(case),
            Err(err) => {
                debug!(index = idx, error = %err, "skipping malformed priority case");
                None
            }
        })
        .collect()
}

/// Locate a priority summary inside a saved analysis.
///
/// Looks at the final output, its `priority_summary` field, the
/// `priority_summary` node's output, then any node output with the right
/// shape (in node id order).
pub fn find_priority_summary(result: &AnalysisResult) -> PriorityInput {
    let candidates = std::iter::once(&result.final_output)
        .chain(result.final_output.get(PRIORITY_NODE_ID))
        .chain(result.node_results.get(PRIORITY_NODE_ID).map(|n| &n.output))
        .chain(result.node_results.values().map(|n| &n.output));

    for candidate in candidates {
        if let input @ PriorityInput::Summary(_) = parse_priority_summary(candidate) {
            return input;
        }
    }
    PriorityInput::NotPrioritySummary
}

/// Added / removed / shared test case ids for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDelta {
    /// Only in B, in B order.
    pub added: Vec<String>,
    /// Only in A, in A order.
    pub removed: Vec<String>,
    /// In both, in A order.
    pub shared: Vec<String>,
}

/// Change in how often a metric appears among failed metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCountDelta {
    pub metric: String,
    pub count_a: usize,
    pub count_b: usize,
    pub delta: i64,
}

/// Full diff of two priority summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityDiff {
    pub bottom: SetDelta,
    pub impact: SetDelta,
    pub metric_deltas: Vec<MetricCountDelta>,
}

/// Which side(s) lacked a priority summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSide {
    A,
    B,
    Both,
}

/// Result of comparing two analyses' priority summaries.
///
/// `NotComparable` is distinct from a diff with no changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriorityComparison {
    Comparable(PriorityDiff),
    NotComparable { missing: MissingSide },
}

/// Compare two validated inputs.
pub fn diff_priority_inputs(a: &PriorityInput, b: &PriorityInput) -> PriorityComparison {
    match (a, b) {
        (PriorityInput::Summary(a), PriorityInput::Summary(b)) => {
            PriorityComparison::Comparable(diff_priority_summaries(a, b))
        }
        (PriorityInput::NotPrioritySummary, PriorityInput::Summary(_)) => {
            PriorityComparison::NotComparable {
                missing: MissingSide::A,
            }
        }
        (PriorityInput::Summary(_), PriorityInput::NotPrioritySummary) => {
            PriorityComparison::NotComparable {
                missing: MissingSide::B,
            }
        }
        (PriorityInput::NotPrioritySummary, PriorityInput::NotPrioritySummary) => {
            PriorityComparison::NotComparable {
                missing: MissingSide::Both,
            }
        }
    }
}

/// Diff two priority summaries category by category.
pub fn diff_priority_summaries(a: &PrioritySummary, b: &PrioritySummary) -> PriorityDiff {
    PriorityDiff {
        bottom: set_delta(&a.bottom_cases, &b.bottom_cases),
        impact: set_delta(&a.impact_cases, &b.impact_cases),
        metric_deltas: failed_metric_deltas(a, b),
    }
}

fn case_ids(cases: &[PriorityCase]) -> Vec<&str> {
    let mut seen = HashSet::new();
    cases
        .iter()
        .filter_map(|c| c.test_case_id.as_deref())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn set_delta(a: &[PriorityCase], b: &[PriorityCase]) -> SetDelta {
    let ids_a = case_ids(a);
    let ids_b = case_ids(b);
    let set_a: HashSet<&str> = ids_a.iter().copied().collect();
    let set_b: HashSet<&str> = ids_b.iter().copied().collect();

    SetDelta {
        added: ids_b
            .iter()
            .filter(|id| !set_a.contains(*id))
            .map(|id| id.to_string())
            .collect(),
        removed: ids_a
            .iter()
            .filter(|id| !set_b.contains(*id))
            .map(|id| id.to_string())
            .collect(),
        shared: ids_a
            .iter()
            .filter(|id| set_b.contains(*id))
            .map(|id| id.to_string())
            .collect(),
    }
}

/// Identity of a priority case for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaseKey {
    Id(String),
    Preview(String),
    Fingerprint(String),
}

/// Dedup key: id, else question preview, else the serialized case.
///
/// Two distinct id-less cases sharing a preview collapse into one.
pub fn case_key(case: &PriorityCase) -> CaseKey {
    if let Some(id) = case.test_case_id.as_deref().filter(|id| !id.is_empty()) {
        return CaseKey::Id(id.to_string());
    }
    if let Some(preview) = case.question_preview.as_deref().filter(|p| !p.is_empty()) {
        return CaseKey::Preview(preview.to_string());
    }
    CaseKey::Fingerprint(serde_json::to_string(case).unwrap_or_default())
}

/// Bottom and impact cases merged, first occurrence per key wins.
pub fn combined_cases(summary: &PrioritySummary) -> Vec<&PriorityCase> {
    let mut seen = HashSet::new();
    summary
        .bottom_cases
        .iter()
        .chain(summary.impact_cases.iter())
        .filter(|case| seen.insert(case_key(case)))
        .collect()
}

fn failed_metric_counts(summary: &PrioritySummary) -> (Vec<String>, HashMap<String, usize>) {
    let mut order = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for case in combined_cases(summary) {
        for metric in &case.failed_metrics {
            let count = counts.entry(metric.clone()).or_insert_with(|| {
                order.push(metric.clone());
                0
            });
            *count += 1;
        }
    }
    (order, counts)
}

fn failed_metric_deltas(a: &PrioritySummary, b: &PrioritySummary) -> Vec<MetricCountDelta> {
    let (order_a, counts_a) = failed_metric_counts(a);
    let (order_b, counts_b) = failed_metric_counts(b);

    let mut seen = HashSet::new();
    let mut rows: Vec<MetricCountDelta> = order_a
        .into_iter()
        .chain(order_b)
        .filter(|metric| seen.insert(metric.clone()))
        .map(|metric| {
            let count_a = counts_a.get(&metric).copied().unwrap_or(0);
            let count_b = counts_b.get(&metric).copied().unwrap_or(0);
            MetricCountDelta {
                delta: count_b as i64 - count_a as i64,
                metric,
                count_a,
                count_b,
            }
        })
        .collect();

    rows.sort_by(|x, y| y.delta.abs().cmp(&x.delta.abs()));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeResult;
    use serde_json::json;

    fn pcase(id: &str, failed: &[&str]) -> PriorityCase {
        PriorityCase {
            test_case_id: Some(id.to_string()),
            failed_metrics: failed.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    fn summary(bottom: Vec<PriorityCase>, impact: Vec<PriorityCase>) -> PrioritySummary {
        PrioritySummary {
            bottom_cases: bottom,
            impact_cases: impact,
            ..Default::default()
        }
    }

    #[test]
    fn test_bottom_set_delta() {
        let a = summary(vec![pcase("t1", &[]), pcase("t2", &[])], vec![]);
        let b = summary(vec![pcase("t2", &[]), pcase("t3", &[])], vec![]);
        let diff = diff_priority_summaries(&a, &b);
        assert_eq!(diff.bottom.added, vec!["t3"]);
        assert_eq!(diff.bottom.removed, vec!["t1"]);
        assert_eq!(diff.bottom.shared, vec!["t2"]);
        assert_eq!(diff.impact, SetDelta::default());
    }

    #[test]
    fn test_failed_metric_deltas() {
        let a = summary(
            vec![pcase("t1", &["faithfulness"]), pcase("t2", &["faithfulness", "context_recall"])],
            vec![pcase("t1", &["faithfulness"])],
        );
        let b = summary(
            vec![pcase("t3", &["context_recall"])],
            vec![pcase("t4", &["context_recall", "answer_relevancy"])],
        );
        let diff = diff_priority_summaries(&a, &b);

        // t1 appears in both categories of A but counts once.
        let faith = diff.metric_deltas.iter().find(|r| r.metric == "faithfulness").unwrap();
        assert_eq!((faith.count_a, faith.count_b, faith.delta), (2, 0, -2));
        let recall = diff.metric_deltas.iter().find(|r| r.metric == "context_recall").unwrap();
        assert_eq!((recall.count_a, recall.count_b, recall.delta), (1, 2, 1));
        assert_eq!(diff.metric_deltas[0].metric, "faithfulness");
    }

    #[test]
    fn test_parse_rejects_unrecognized_shape() {
        assert_eq!(parse_priority_summary(&json!({"summary": "x"})), PriorityInput::NotPrioritySummary);
        assert_eq!(parse_priority_summary(&json!([1, 2])), PriorityInput::NotPrioritySummary);
        assert_eq!(
            parse_priority_summary(&json!({"bottom_cases": "not an array"})),
            PriorityInput::NotPrioritySummary
        );
    }

    #[test]
    fn test_parse_skips_malformed_cases() {
        let value = json!({
            "bottom_cases": [
                {"test_case_id": "t1", "avg_score": 0.2, "failed_metrics": ["faithfulness"]},
                "garbage",
                {"test_case_id": "t2", "avg_score": "bad"}
            ],
            "total_cases": 40
        });
        let PriorityInput::Summary(summary) = parse_priority_summary(&value) else {
            panic!("expected a summary");
        };
        // The non-object entry is dropped; the bad score only loses its value.
        assert_eq!(summary.bottom_cases.len(), 2);
        assert_eq!(summary.bottom_cases[1].test_case_id.as_deref(), Some("t2"));
        assert_eq!(summary.bottom_cases[1].avg_score, 0.0);
        assert!(summary.impact_cases.is_empty());
        assert_eq!(summary.total_cases, Some(40));
    }

    #[test]
    fn test_case_with_bad_field_stays_in_set_delta() {
        let a = parse_priority_summary(&json!({
            "bottom_cases": [
                {"test_case_id": "t1", "avg_score": 0.2},
                {"test_case_id": "t2", "avg_score": null, "failed_metrics": ["faithfulness"]},
                {"test_case_id": 7, "gap_by_metric": {"faithfulness": null}}
            ]
        }));
        let b = parse_priority_summary(&json!({
            "bottom_cases": [{"test_case_id": "t1", "avg_score": 0.3}]
        }));

        let PriorityComparison::Comparable(diff) = diff_priority_inputs(&a, &b) else {
            panic!("expected a comparison");
        };
        assert_eq!(diff.bottom.removed, vec!["t2", "7"]);
        assert_eq!(diff.bottom.shared, vec!["t1"]);
        let faith = diff.metric_deltas.iter().find(|r| r.metric == "faithfulness").unwrap();
        assert_eq!((faith.count_a, faith.count_b), (1, 0));
    }

    #[test]
    fn test_not_comparable_is_explicit() {
        let valid = PriorityInput::Summary(PrioritySummary::default());
        let missing = PriorityInput::NotPrioritySummary;
        assert_eq!(
            diff_priority_inputs(&valid, &missing),
            PriorityComparison::NotComparable { missing: MissingSide::B }
        );
        assert_eq!(
            diff_priority_inputs(&missing, &missing),
            PriorityComparison::NotComparable { missing: MissingSide::Both }
        );
        assert!(matches!(
            diff_priority_inputs(&valid, &valid),
            PriorityComparison::Comparable(_)
        ));
    }

    #[test]
    fn test_dedup_falls_back_to_preview_then_fingerprint() {
        let no_id = |preview: Option<&str>, score: f64| PriorityCase {
            question_preview: preview.map(str::to_string),
            avg_score: score,
            failed_metrics: vec!["faithfulness".to_string()],
            ..Default::default()
        };
        let s = summary(
            vec![no_id(Some("What is X?"), 0.1), no_id(None, 0.2), no_id(None, 0.3)],
            vec![no_id(Some("What is X?"), 0.9), no_id(None, 0.2)],
        );
        let combined = combined_cases(&s);
        // preview duplicate and identical fingerprint collapse; distinct fingerprints stay.
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[0].avg_score, 0.1);
    }

    #[test]
    fn test_preview_collision_merges_distinct_cases() {
        let a = PriorityCase {
            question_preview: Some("How do I reset my password...".to_string()),
            failed_metrics: vec!["faithfulness".to_string()],
            ..Default::default()
        };
        let b = PriorityCase {
            question_preview: Some("How do I reset my password...".to_string()),
            failed_metrics: vec!["context_recall".to_string()],
            ..Default::default()
        };
        assert_eq!(case_key(&a), case_key(&b));
        let s = summary(vec![a, b], vec![]);
        assert_eq!(combined_cases(&s).len(), 1);
    }

    #[test]
    fn test_find_priority_summary_locations() {
        let shaped = json!({"bottom_cases": [{"test_case_id": "t1"}]});

        let in_final = AnalysisResult {
            result_id: "r".into(),
            final_output: json!({"priority_summary": shaped.clone()}),
            node_results: Default::default(),
        };
        assert!(find_priority_summary(&in_final).as_summary().is_some());

        let mut nodes = std::collections::BTreeMap::new();
        nodes.insert(
            "priority_summary".to_string(),
            NodeResult {
                status: "completed".into(),
                error: None,
                output: shaped,
            },
        );
        let in_node = AnalysisResult {
            result_id: "r".into(),
            final_output: json!({"report": "text"}),
            node_results: nodes,
        };
        assert!(find_priority_summary(&in_node).as_summary().is_some());

        let none = AnalysisResult {
            result_id: "r".into(),
            final_output: json!({"score": 1}),
            node_results: Default::default(),
        };
        assert_eq!(find_priority_summary(&none), PriorityInput::NotPrioritySummary);
    }
}
