//! In-memory stores.

use super::{AnalysisStore, ClusterMapStore, RunStore, newest};
use crate::error::{ExplorerError, Result};
use crate::model::{AnalysisResult, ClusterAssignment, ClusterItem, RunDetails, RunSummary};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Runs, analyses and cluster maps held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<HashMap<String, RunDetails>>,
    analyses: Mutex<HashMap<String, AnalysisResult>>,
    cluster_maps: Mutex<HashMap<String, Vec<ClusterAssignment>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a run.
    pub fn insert_run(&self, run: RunDetails) {
        lock(&self.runs).insert(run.summary.run_id.clone(), run);
    }

    /// Add or replace an analysis result.
    pub fn insert_analysis(&self, result: AnalysisResult) {
        lock(&self.analyses).insert(result.result_id.clone(), result);
    }
}

impl RunStore for MemoryStore {
    async fn get_run(&self, run_id: &str) -> Result<RunDetails> {
        lock(&self.runs)
            .get(run_id)
            .cloned()
            .ok_or_else(|| ExplorerError::RunNotFound(run_id.to_string()))
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut summaries: Vec<RunSummary> = lock(&self.runs).values().map(|r| r.summary.clone()).collect();
        summaries.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(summaries)
    }
}

impl AnalysisStore for MemoryStore {
    async fn get_analysis(&self, result_id: &str) -> Result<AnalysisResult> {
        lock(&self.analyses)
            .get(result_id)
            .cloned()
            .ok_or_else(|| ExplorerError::AnalysisNotFound(result_id.to_string()))
    }
}

impl ClusterMapStore for MemoryStore {
    async fn list_cluster_maps(&self, run_id: &str) -> Result<Vec<ClusterAssignment>> {
        Ok(lock(&self.cluster_maps).get(run_id).cloned().unwrap_or_default())
    }

    async fn get_cluster_map(&self, run_id: &str, map_id: Option<&str>) -> Result<ClusterAssignment> {
        let versions = lock(&self.cluster_maps).get(run_id).cloned().unwrap_or_default();
        let found = match map_id {
            Some(id) => versions.into_iter().find(|v| v.map_id == id),
            None => newest(versions),
        };
        found.ok_or_else(|| ExplorerError::cluster_map_not_found(run_id, map_id))
    }

    async fn save_cluster_map(
        &self,
        run_id: &str,
        items: Vec<ClusterItem>,
        source: Option<String>,
    ) -> Result<ClusterAssignment> {
        let assignment = ClusterAssignment::new_version(run_id, items, source);
        lock(&self.cluster_maps)
            .entry(run_id.to_string())
            .or_default()
            .push(assignment.clone());
        Ok(assignment)
    }

    async fn delete_cluster_map(&self, run_id: &str, map_id: &str) -> Result<()> {
        let mut maps = lock(&self.cluster_maps);
        let versions = maps
            .get_mut(run_id)
            .ok_or_else(|| ExplorerError::cluster_map_not_found(run_id, Some(map_id)))?;
        let before = versions.len();
        versions.retain(|v| v.map_id != map_id);
        if versions.len() == before {
            return Err(ExplorerError::cluster_map_not_found(run_id, Some(map_id)));
        }
        Ok(())
    }
}
