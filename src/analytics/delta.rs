//! Metric delta engine.
//!
//! Works on any `name -> value` table: whole-run metric averages, per-case
//! scores, thresholds, or dotted paths pulled out of an analysis output.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One row of a two-sided metric comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRow {
    /// Metric name or dotted path.
    pub name: String,
    /// Value on side A, if present.
    pub value_a: Option<f64>,
    /// Value on side B, if present.
    pub value_b: Option<f64>,
    /// `B - A` when both sides are present. A missing side is not a zero.
    pub delta: Option<f64>,
}

impl DeltaRow {
    /// Magnitude used for ranking; a missing delta ranks as zero.
    pub fn magnitude(&self) -> f64 {
        self.delta.map(f64::abs).unwrap_or(0.0)
    }
}

/// Compare two metric tables.
///
/// Rows cover the union of names: A's names in order, then names only in B.
/// Rows are sorted by `|delta|` descending; ties keep that union order.
/// If a name repeats within one table, its first value is used.
pub fn compute_deltas(metrics_a: &[(String, f64)], metrics_b: &[(String, f64)]) -> Vec<DeltaRow> {
    let lookup_a = first_values(metrics_a);
    let lookup_b = first_values(metrics_b);

    let mut seen = HashSet::with_capacity(metrics_a.len() + metrics_b.len());
    let names: Vec<&str> = metrics_a
        .iter()
        .chain(metrics_b.iter())
        .map(|(name, _)| name.as_str())
        .filter(|name| seen.insert(*name))
        .collect();

    let mut rows: Vec<DeltaRow> = names
        .into_iter()
        .map(|name| {
            let value_a = lookup_a.get(name).copied();
            let value_b = lookup_b.get(name).copied();
            let delta = match (value_a, value_b) {
                (Some(a), Some(b)) => Some(b - a),
                _ => None,
            };
            DeltaRow {
                name: name.to_string(),
                value_a,
                value_b,
                delta,
            }
        })
        .collect();

    rows.sort_by(|x, y| y.magnitude().total_cmp(&x.magnitude()));
    rows
}

fn first_values(metrics: &[(String, f64)]) -> HashMap<&str, f64> {
    let mut map = HashMap::with_capacity(metrics.len());
    for (name, value) in metrics {
        map.entry(name.as_str()).or_insert(*value);
    }
    map
}

/// Convert any `(name, value)` iterator into the table form used above.
pub fn to_table<'a, I>(entries: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (&'a String, &'a f64)>,
{
    entries.into_iter().map(|(k, v)| (k.clone(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, f64)]) -> Vec<(String, f64)> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_delta_for_shared_key() {
        let rows = compute_deltas(&table(&[("a", 1.0), ("b", 2.0)]), &table(&[("a", 1.0), ("b", 3.0)]));
        let b = rows.iter().find(|r| r.name == "b").unwrap();
        assert_eq!(b.delta, Some(1.0));
        assert_eq!(rows[0].name, "b");
    }

    #[test]
    fn test_missing_side_is_null_not_zero() {
        let rows = compute_deltas(&table(&[("only_a", 0.5), ("x", 0.1)]), &table(&[("x", 0.2), ("only_b", 0.0)]));
        let only_a = rows.iter().find(|r| r.name == "only_a").unwrap();
        assert_eq!(only_a.value_a, Some(0.5));
        assert_eq!(only_a.value_b, None);
        assert_eq!(only_a.delta, None);

        let only_b = rows.iter().find(|r| r.name == "only_b").unwrap();
        assert_eq!(only_b.value_b, Some(0.0));
        assert_eq!(only_b.delta, None);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_sorted_by_magnitude() {
        let rows = compute_deltas(
            &table(&[("small", 0.5), ("big", 0.9), ("missing", 0.3), ("neg", 0.8)]),
            &table(&[("small", 0.55), ("big", 0.2), ("neg", 0.5)]),
        );
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["big", "neg", "small", "missing"]);
    }

    #[test]
    fn test_dotted_paths() {
        let rows = compute_deltas(
            &table(&[("score.faithfulness", 0.8)]),
            &table(&[("score.faithfulness", 0.9), ("score.nested.x.avg", 2.0)]),
        );
        assert_eq!(rows.len(), 2);
        assert!((rows[0].delta.unwrap() - 0.1).abs() < 1e-12);
    }
}
