//! Cluster color assignment.
//!
//! Colors follow the order in which cluster ids first appear, cycling
//! through a fixed palette. The mapping is recomputed on every projection,
//! so a cluster's color is stable within one pass but can move when the set
//! of clusters present changes.

use crate::analytics::projection::ScatterPoint;
use serde::Serialize;
use std::collections::HashMap;

/// Ten-color categorical palette.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

/// Color per cluster id for one rendering pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterPalette {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ClusterPalette {
    /// Assign colors to cluster ids in first-appearance order.
    ///
    /// An empty `palette` falls back to [`DEFAULT_PALETTE`].
    pub fn derive<'a, I, S>(cluster_ids: I, palette: &[S]) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        S: AsRef<str>,
    {
        let colors: Vec<&str> = if palette.is_empty() {
            DEFAULT_PALETTE.to_vec()
        } else {
            palette.iter().map(|c| c.as_ref()).collect()
        };

        let mut result = Self::default();
        for id in cluster_ids {
            if result.index.contains_key(id) {
                continue;
            }
            let color = colors[result.entries.len() % colors.len()];
            result.index.insert(id.to_string(), result.entries.len());
            result.entries.push((id.to_string(), color.to_string()));
        }
        result
    }

    /// Palette for the clusters present in a set of points.
    pub fn for_points<S: AsRef<str>>(points: &[ScatterPoint], palette: &[S]) -> Self {
        Self::derive(points.iter().filter_map(|p| p.cluster_id.as_deref()), palette)
    }

    pub fn color_of(&self, cluster_id: &str) -> Option<&str> {
        self.index
            .get(cluster_id)
            .map(|&i| self.entries[i].1.as_str())
    }

    /// `(cluster_id, color)` pairs in assignment order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_OVERRIDE: &[&str] = &[];

    #[test]
    fn test_first_appearance_order() {
        let palette = ClusterPalette::derive(["b", "a", "b", "c"], NO_OVERRIDE);
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.color_of("b"), Some(DEFAULT_PALETTE[0]));
        assert_eq!(palette.color_of("a"), Some(DEFAULT_PALETTE[1]));
        assert_eq!(palette.color_of("c"), Some(DEFAULT_PALETTE[2]));
        assert_eq!(palette.color_of("zzz"), None);
    }

    #[test]
    fn test_palette_cycles() {
        let custom = vec!["#000".to_string(), "#fff".to_string()];
        let palette = ClusterPalette::derive(["a", "b", "c"], &custom);
        assert_eq!(palette.color_of("c"), Some("#000"));
    }

    #[test]
    fn test_colors_shift_when_cluster_set_changes() {
        let first = ClusterPalette::derive(["a", "b"], NO_OVERRIDE);
        let second = ClusterPalette::derive(["b"], NO_OVERRIDE);
        assert_ne!(first.color_of("b"), second.color_of("b"));
    }
}
