//! Flattens numeric leaves of an arbitrary JSON tree into dotted paths.
//!
//! Used to diff the `final_output` of two saved analyses without knowing
//! their schema up front.

use serde_json::Value;
use std::collections::HashSet;

/// Objects at this depth are not descended into. The root is depth 0.
pub const MAX_DEPTH: usize = 4;

/// Keys holding bulk or narrative data rather than scalar metrics.
pub const SKIPPED_KEYS: &[&str] = &[
    "report",
    "llm_report",
    "markdown",
    "evidence",
    "documents",
    "contexts",
    "cases",
    "per_case",
    "test_cases",
    "bottom_cases",
    "impact_cases",
    "rows",
    "raw",
    "samples",
];

/// Extract every finite numeric leaf as `(dotted.path, value)`.
///
/// - A number at path `P` yields `(P, n)`.
/// - An array whose elements are all numbers yields `(P.avg, mean)`; empty or
///   mixed arrays are skipped.
/// - Objects are walked key by key, skipping [`SKIPPED_KEYS`].
///
/// Output follows the walk's insertion order. A bare scalar root has no
/// path and yields nothing.
pub fn extract_numerics(tree: &Value) -> Vec<(String, f64)> {
    let mut walker = Walker {
        out: Vec::new(),
        visited: HashSet::new(),
    };
    walker.walk(tree, "", 0);
    walker.out
}

struct Walker {
    out: Vec<(String, f64)>,
    /// Containers already entered, by address.
    visited: HashSet<*const Value>,
}

impl Walker {
    fn walk(&mut self, value: &Value, path: &str, depth: usize) {
        match value {
            Value::Number(n) => {
                if let Some(x) = n.as_f64().filter(|x| x.is_finite()) {
                    if !path.is_empty() {
                        self.out.push((path.to_string(), x));
                    }
                }
            }
            Value::Array(items) => {
                if path.is_empty() {
                    return;
                }
                if let Some(mean) = numeric_mean(items) {
                    self.out.push((format!("{path}.avg"), mean));
                }
            }
            Value::Object(map) => {
                if depth >= MAX_DEPTH {
                    return;
                }
                if !self.visited.insert(value as *const Value) {
                    return;
                }
                for (key, child) in map {
                    if SKIPPED_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    self.walk(child, &child_path, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Mean of an all-numeric, non-empty array.
///
/// Kept as a running mean so large values cannot overflow a sum.
fn numeric_mean(items: &[Value]) -> Option<f64> {
    if items.is_empty() {
        return None;
    }
    let mut mean = 0.0;
    for (i, item) in items.iter().enumerate() {
        let x = item.as_f64().filter(|x| x.is_finite())?;
        let n = (i + 1) as f64;
        mean += x / n - mean / n;
    }
    Some(mean).filter(|m| m.is_finite())
}
