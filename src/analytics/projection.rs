//! Spatial projection of test cases into a fixed 3-axis metric space.
//!
//! Each axis is the mean of a named metric group. Cluster assignments only
//! color and filter the points; they never change coordinates.

use super::aggregate::{average, case_average, case_pass_rate};
use super::normalize::normalize_score;
use crate::model::{ClusterAssignment, TestCaseResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Default split point for the quadrant legend.
pub const DEFAULT_QUADRANT_THRESHOLD: f64 = 0.70;

/// The three projection axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Groundedness,
    Relevance,
    SummaryQuality,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Groundedness, Axis::Relevance, Axis::SummaryQuality];

    /// Metrics averaged to produce this coordinate.
    pub fn metrics(&self) -> &'static [&'static str] {
        match self {
            Axis::Groundedness => &[
                "faithfulness",
                "factual_correctness",
                "context_precision",
                "context_recall",
            ],
            Axis::Relevance => &["answer_relevancy", "semantic_similarity"],
            Axis::SummaryQuality => &["summary_score", "summary_faithfulness", "entity_preservation"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Axis::Groundedness => "groundedness",
            Axis::Relevance => "relevance",
            Axis::SummaryQuality => "summary quality",
        }
    }
}

/// One test case placed in the metric space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Mean over all of the case's metrics.
    pub avg: f64,
    pub pass_rate: f64,
    pub failed_metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

/// Coordinate for one axis, falling back to the case average when none of
/// the axis metrics are present.
pub fn axis_value(result: &TestCaseResult, axis: Axis) -> f64 {
    let group = axis.metrics();
    let scores: Vec<f64> = result
        .metrics
        .iter()
        .filter(|m| group.contains(&m.name.as_str()))
        .map(|m| normalize_score(m.score))
        .collect();

    if scores.is_empty() {
        case_average(result)
    } else {
        average(&scores)
    }
}

/// Place one case. `cluster_of` maps test case ids to cluster ids.
pub fn project(result: &TestCaseResult, cluster_of: &HashMap<String, String>) -> ScatterPoint {
    ScatterPoint {
        id: result.test_case_id.clone(),
        x: axis_value(result, Axis::Groundedness),
        y: axis_value(result, Axis::Relevance),
        z: axis_value(result, Axis::SummaryQuality),
        avg: case_average(result),
        pass_rate: case_pass_rate(result),
        failed_metrics: result
            .metrics
            .iter()
            .filter(|m| !m.passed)
            .map(|m| m.name.clone())
            .collect(),
        cluster_id: cluster_of.get(&result.test_case_id).cloned(),
    }
}

/// How much of a run the active cluster map covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCoverage {
    /// Points with a cluster id.
    pub assigned: usize,
    pub total: usize,
    /// `assigned / total`, `0.0` for an empty run.
    pub ratio: f64,
}

impl ClusterCoverage {
    pub fn percent(&self) -> f64 {
        self.ratio * 100.0
    }
}

/// All points of a run plus cluster coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub points: Vec<ScatterPoint>,
    pub coverage: ClusterCoverage,
    /// Assignment ids that matched no case in the run.
    pub unmatched_ids: Vec<String>,
}

/// Project a whole run, coloring by `assignment` when one is active.
///
/// Assignment entries naming unknown test cases are reported, not rejected.
pub fn project_run(results: &[TestCaseResult], assignment: Option<&ClusterAssignment>) -> Projection {
    let cluster_of = assignment.map(ClusterAssignment::cluster_of).unwrap_or_default();
    let points: Vec<ScatterPoint> = results.iter().map(|r| project(r, &cluster_of)).collect();

    let assigned = points.iter().filter(|p| p.cluster_id.is_some()).count();
    let total = points.len();
    let ratio = if total == 0 {
        0.0
    } else {
        assigned as f64 / total as f64
    };

    let known: HashSet<&str> = results.iter().map(|r| r.test_case_id.as_str()).collect();
    let mut seen = HashSet::new();
    let unmatched_ids = assignment
        .map(|a| {
            a.items
                .iter()
                .map(|item| item.test_case_id.as_str())
                .filter(|id| !known.contains(id) && seen.insert(*id))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Projection {
        points,
        coverage: ClusterCoverage {
            assigned,
            total,
            ratio,
        },
        unmatched_ids,
    }
}

/// Keep points whose cluster is selected. An empty selection keeps everything.
pub fn filter_by_clusters<'a>(points: &'a [ScatterPoint], selected: &HashSet<String>) -> Vec<&'a ScatterPoint> {
    points
        .iter()
        .filter(|p| {
            selected.is_empty()
                || p.cluster_id
                    .as_ref()
                    .is_some_and(|cluster| selected.contains(cluster))
        })
        .collect()
}

/// Aggregate view of one cluster's points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster_id: String,
    pub count: usize,
    pub mean_avg: f64,
    pub mean_pass_rate: f64,
}

/// Per-cluster statistics in order of first appearance. Unclustered points are ignored.
pub fn cluster_stats(points: &[ScatterPoint]) -> Vec<ClusterStats> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&ScatterPoint>> = HashMap::new();
    for point in points {
        if let Some(cluster) = point.cluster_id.as_deref() {
            groups
                .entry(cluster)
                .or_insert_with(|| {
                    order.push(cluster);
                    Vec::new()
                })
                .push(point);
        }
    }

    order
        .into_iter()
        .map(|cluster| {
            let members = &groups[cluster];
            let avgs: Vec<f64> = members.iter().map(|p| p.avg).collect();
            let rates: Vec<f64> = members.iter().map(|p| p.pass_rate).collect();
            ClusterStats {
                cluster_id: cluster.to_string(),
                count: members.len(),
                mean_avg: average(&avgs),
                mean_pass_rate: average(&rates),
            }
        })
        .collect()
}

/// Legend regions of the groundedness (x) / relevance (y) plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    /// Grounded and relevant.
    Expand,
    /// Relevant but poorly grounded.
    SearchBoost,
    /// Grounded but off-target answers.
    GenerationFix,
    /// Neither.
    Reset,
}

impl Quadrant {
    /// Region for a point; values equal to the threshold count as high.
    pub fn classify(x: f64, y: f64, threshold: f64) -> Self {
        match (x >= threshold, y >= threshold) {
            (true, true) => Quadrant::Expand,
            (false, true) => Quadrant::SearchBoost,
            (true, false) => Quadrant::GenerationFix,
            (false, false) => Quadrant::Reset,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::Expand => "expand",
            Quadrant::SearchBoost => "search boost",
            Quadrant::GenerationFix => "generation fix",
            Quadrant::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusterItem, MetricScore};

    fn case(id: &str, metrics: &[(&str, f64, bool)]) -> TestCaseResult {
        TestCaseResult::new(
            id,
            metrics
                .iter()
                .map(|(n, s, p)| MetricScore::new(*n, *s, *p))
                .collect(),
        )
    }

    #[test]
    fn test_axes_use_metric_groups() {
        let c = case(
            "t1",
            &[
                ("faithfulness", 0.8, true),
                ("context_recall", 60.0, false),
                ("answer_relevancy", 0.9, true),
                ("summary_score", 0.5, false),
            ],
        );
        let point = project(&c, &HashMap::new());
        assert!((point.x - 0.7).abs() < 1e-12);
        assert!((point.y - 0.9).abs() < 1e-12);
        assert!((point.z - 0.5).abs() < 1e-12);
        assert!((point.avg - 0.7).abs() < 1e-12);
        assert!((point.pass_rate - 0.5).abs() < 1e-12);
        assert_eq!(point.failed_metrics, vec!["context_recall", "summary_score"]);
        assert_eq!(point.cluster_id, None);
    }

    #[test]
    fn test_axis_falls_back_to_case_average() {
        let c = case("t1", &[("faithfulness", 0.4, false), ("custom", 1.0, true)]);
        let point = project(&c, &HashMap::new());
        assert!((point.x - 0.4).abs() < 1e-12);
        assert!((point.y - 0.7).abs() < 1e-12);
        assert!((point.z - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_project_run_coverage_and_unmatched() {
        let results = vec![case("t1", &[]), case("t2", &[]), case("t3", &[]), case("t4", &[])];
        let assignment = ClusterAssignment::new_version(
            "run-1",
            vec![
                ClusterItem::new("t1", "a"),
                ClusterItem::new("t3", "b"),
                ClusterItem::new("ghost", "a"),
            ],
            None,
        );
        let projection = project_run(&results, Some(&assignment));
        assert_eq!(projection.coverage.assigned, 2);
        assert_eq!(projection.coverage.total, 4);
        assert!((projection.coverage.percent() - 50.0).abs() < 1e-9);
        assert_eq!(projection.unmatched_ids, vec!["ghost"]);
        assert_eq!(projection.points[2].cluster_id.as_deref(), Some("b"));

        let bare = project_run(&results, None);
        assert_eq!(bare.coverage.assigned, 0);
        assert!(bare.unmatched_ids.is_empty());
    }

    #[test]
    fn test_filter_and_stats() {
        let mut points: Vec<ScatterPoint> = ["t1", "t2", "t3"]
            .iter()
            .map(|id| project(&case(id, &[("faithfulness", 1.0, true)]), &HashMap::new()))
            .collect();
        points[0].cluster_id = Some("a".into());
        points[1].cluster_id = Some("b".into());
        points[1].avg = 0.5;

        let all = filter_by_clusters(&points, &HashSet::new());
        assert_eq!(all.len(), 3);

        let selected: HashSet<String> = ["b".to_string()].into_iter().collect();
        let only_b = filter_by_clusters(&points, &selected);
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].id, "t2");

        let stats = cluster_stats(&points);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].cluster_id, "a");
        assert_eq!(stats[1].count, 1);
        assert!((stats[1].mean_avg - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_quadrants() {
        let t = DEFAULT_QUADRANT_THRESHOLD;
        assert_eq!(Quadrant::classify(0.9, 0.9, t), Quadrant::Expand);
        assert_eq!(Quadrant::classify(0.5, 0.9, t), Quadrant::SearchBoost);
        assert_eq!(Quadrant::classify(0.9, 0.5, t), Quadrant::GenerationFix);
        assert_eq!(Quadrant::classify(0.1, 0.1, t), Quadrant::Reset);
        assert_eq!(Quadrant::classify(0.7, 0.7, t), Quadrant::Expand);
    }

    #[test]
    fn test_scatter_point_json_field_names() {
        let point = project(&case("t1", &[("faithfulness", 0.5, false)]), &HashMap::new());
        let json = serde_json::to_value(&point).unwrap();
        assert!(json.get("passRate").is_some());
        assert!(json.get("failedMetrics").is_some());
        assert!(json.get("clusterId").is_none());
    }
}
