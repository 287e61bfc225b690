//! Entities read from the run, analysis and cluster-map stores.
//!
//! All of these are plain data. Scores are kept exactly as the store reports
//! them; canonicalization to [0, 1] happens when a value is consumed (see
//! [`crate::analytics::normalize`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// One named metric score attached to a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    /// Metric name (e.g. "faithfulness").
    pub name: String,

    /// Raw score on whatever scale the evaluator used ([0,1], [0,100] or 0/1).
    /// `null` and unparseable values are read as NaN.
    #[serde(deserialize_with = "deserialize_raw_score")]
    pub score: f64,

    /// Whether the score met the metric's threshold.
    #[serde(default)]
    pub passed: bool,

    /// Evaluator explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MetricScore {
    /// Create a metric score with no reason.
    pub fn new(name: impl Into<String>, score: f64, passed: bool) -> Self {
        Self {
            name: name.into(),
            score,
            passed,
            reason: None,
        }
    }
}

/// Accepts numbers, booleans, numeric strings and null for a score field.
fn deserialize_raw_score<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

/// A single evaluated question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Identifier, unique within a run.
    pub test_case_id: String,

    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub answer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,

    /// Metric scores for this case.
    #[serde(default)]
    pub metrics: Vec<MetricScore>,
}

impl TestCaseResult {
    /// Create a test case with the given metrics and empty text fields.
    pub fn new(test_case_id: impl Into<String>, metrics: Vec<MetricScore>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            question: String::new(),
            answer: String::new(),
            ground_truth: None,
            contexts: None,
            metrics,
        }
    }

    /// Find a metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricScore> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Summary of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,

    #[serde(default)]
    pub dataset_name: String,

    #[serde(default)]
    pub model_name: String,

    /// Fraction of test cases that passed every metric.
    #[serde(default)]
    pub pass_rate: f64,

    #[serde(default)]
    pub total_test_cases: usize,

    #[serde(default)]
    pub passed_test_cases: usize,

    #[serde(default)]
    pub metrics_evaluated: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    /// Per-metric pass thresholds used by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_profile: Option<String>,
}

impl RunSummary {
    /// Create a summary with only an id and pass rate set.
    pub fn new(run_id: impl Into<String>, pass_rate: f64) -> Self {
        Self {
            run_id: run_id.into(),
            dataset_name: String::new(),
            model_name: String::new(),
            pass_rate,
            total_test_cases: 0,
            passed_test_cases: 0,
            metrics_evaluated: Vec::new(),
            started_at: None,
            finished_at: None,
            thresholds: None,
            threshold_profile: None,
        }
    }
}

/// A run summary together with its per-case results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    pub summary: RunSummary,

    #[serde(default)]
    pub results: Vec<TestCaseResult>,
}

/// A test case singled out by the priority-summary pipeline node.
///
/// Every field is read leniently: a badly typed value falls back to the
/// field's default instead of rejecting the whole case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PriorityCase {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_lenient_id")]
    pub test_case_id: Option<String>,

    /// Truncated question text, used to identify cases that carry no id.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_lenient_id")]
    pub question_preview: Option<String>,

    #[serde(deserialize_with = "deserialize_lenient_number")]
    pub avg_score: f64,

    #[serde(deserialize_with = "deserialize_lenient_strings")]
    pub failed_metrics: Vec<String>,

    #[serde(deserialize_with = "deserialize_lenient_gaps")]
    pub gap_by_metric: BTreeMap<String, f64>,

    #[serde(deserialize_with = "deserialize_lenient_number")]
    pub impact_score: f64,

    #[serde(deserialize_with = "deserialize_lenient_strings")]
    pub tags: Vec<String>,
}

fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Strings and numbers become text; anything else is `None`.
fn deserialize_lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_as_text(&Value::deserialize(deserializer)?))
}

/// Finite numbers and numeric strings; anything else is `0.0`.
fn deserialize_lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_as_f64(&Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Array entries that read as text; a non-array is empty.
fn deserialize_lenient_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().filter_map(value_as_text).collect(),
        _ => Vec::new(),
    })
}

/// Object entries with numeric values; other entries are dropped.
fn deserialize_lenient_gaps<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(metric, gap)| value_as_f64(gap).map(|g| (metric.clone(), g)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// Bottom-performer and high-impact case sets for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PrioritySummary {
    #[serde(default)]
    pub bottom_cases: Vec<PriorityCase>,

    #[serde(default)]
    pub impact_cases: Vec<PriorityCase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_percentile: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cases: Option<usize>,
}

/// One node's outcome inside a saved analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub output: Value,
}

/// A saved pipeline-analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub result_id: String,

    #[serde(default)]
    pub final_output: Value,

    #[serde(default)]
    pub node_results: BTreeMap<String, NodeResult>,
}

/// Assignment of one test case to one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterItem {
    pub test_case_id: String,
    pub cluster_id: String,
}

impl ClusterItem {
    pub fn new(test_case_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            cluster_id: cluster_id.into(),
        }
    }
}

/// One saved version of a run's cluster map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub map_id: String,

    pub run_id: String,

    /// Where the assignment came from (file name, tool, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub items: Vec<ClusterItem>,
}

static VERSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

impl ClusterAssignment {
    /// Stamp a new version for `run_id`.
    ///
    /// The map id is a short hash over the run id, creation time, a
    /// process-wide sequence number and the items, so two saves issued at
    /// the same instant still get distinct ids.
    pub fn new_version(run_id: &str, items: Vec<ClusterItem>, source: Option<String>) -> Self {
        let created_at = Utc::now();
        let sequence = VERSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        hasher.update(run_id.as_bytes());
        hasher.update(&created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(&sequence.to_le_bytes());
        for item in &items {
            hasher.update(item.test_case_id.as_bytes());
            hasher.update(b"\0");
            hasher.update(item.cluster_id.as_bytes());
            hasher.update(b"\n");
        }
        let hex = hasher.finalize().to_hex();

        Self {
            map_id: hex[..16].to_string(),
            run_id: run_id.to_string(),
            source,
            created_at,
            items,
        }
    }

    /// Lookup table from test case id to cluster id. Later duplicates win.
    pub fn cluster_of(&self) -> HashMap<String, String> {
        self.items
            .iter()
            .map(|item| (item.test_case_id.clone(), item.cluster_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_score_parsing() {
        let json = r#"[
            {"name": "a", "score": 0.5, "passed": true},
            {"name": "b", "score": true, "passed": true},
            {"name": "c", "score": null, "passed": false},
            {"name": "d", "score": "87", "passed": true}
        ]"#;
        let metrics: Vec<MetricScore> = serde_json::from_str(json).unwrap();
        assert_eq!(metrics[0].score, 0.5);
        assert_eq!(metrics[1].score, 1.0);
        assert!(metrics[2].score.is_nan());
        assert_eq!(metrics[3].score, 87.0);
    }

    #[test]
    fn test_run_details_deserialize_minimal() {
        let json = r#"{
            "summary": {"run_id": "r1", "pass_rate": 0.5},
            "results": [{"test_case_id": "t1", "metrics": []}]
        }"#;
        let run: RunDetails = serde_json::from_str(json).unwrap();
        assert_eq!(run.summary.run_id, "r1");
        assert_eq!(run.results.len(), 1);
        assert!(run.results[0].metrics.is_empty());
        assert!(run.summary.thresholds.is_none());
    }

    #[test]
    fn test_priority_case_bad_fields_fall_back() {
        let case: PriorityCase = serde_json::from_value(serde_json::json!({
            "test_case_id": 17,
            "avg_score": null,
            "impact_score": "0.4",
            "failed_metrics": ["faithfulness", null, 3],
            "gap_by_metric": {"faithfulness": 0.3, "context_recall": null},
            "tags": "not a list"
        }))
        .unwrap();
        assert_eq!(case.test_case_id.as_deref(), Some("17"));
        assert_eq!(case.avg_score, 0.0);
        assert_eq!(case.impact_score, 0.4);
        assert_eq!(case.failed_metrics, vec!["faithfulness", "3"]);
        assert_eq!(case.gap_by_metric.len(), 1);
        assert_eq!(case.gap_by_metric.get("faithfulness"), Some(&0.3));
        assert!(case.tags.is_empty());
    }

    #[test]
    fn test_new_versions_get_distinct_ids() {
        let items = vec![ClusterItem::new("t1", "a")];
        let v1 = ClusterAssignment::new_version("run-1", items.clone(), None);
        let v2 = ClusterAssignment::new_version("run-1", items, None);
        assert_ne!(v1.map_id, v2.map_id);
        assert_eq!(v1.map_id.len(), 16);
        assert_eq!(v1.run_id, "run-1");
    }

    #[test]
    fn test_cluster_of() {
        let assignment = ClusterAssignment::new_version(
            "run-1",
            vec![ClusterItem::new("t1", "a"), ClusterItem::new("t2", "b")],
            Some("upload.csv".to_string()),
        );
        let map = assignment.cluster_of();
        assert_eq!(map.get("t1").map(String::as_str), Some("a"));
        assert_eq!(map.get("t2").map(String::as_str), Some("b"));
    }
}
