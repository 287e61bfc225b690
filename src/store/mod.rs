//! Store interfaces and their adapters.
//!
//! The analytics never perform I/O. These traits are the seam between the
//! pure functions and wherever runs, analyses and cluster maps live:
//!
//! - [`file::FileStore`]: JSON files under a data directory
//! - [`http::ApiClient`]: the dashboard HTTP API
//! - [`memory::MemoryStore`]: in-process maps, for tests and embedding

pub mod file;
pub mod http;
pub mod memory;

use crate::error::Result;
use crate::model::{AnalysisResult, ClusterAssignment, ClusterItem, RunDetails, RunSummary};
use std::future::Future;

/// Read-only access to evaluation runs.
pub trait RunStore {
    /// Summary plus per-case results of one run.
    fn get_run(&self, run_id: &str) -> impl Future<Output = Result<RunDetails>> + Send;

    /// Summaries of every known run.
    fn list_runs(&self) -> impl Future<Output = Result<Vec<RunSummary>>> + Send;
}

/// Read-only access to saved pipeline analyses.
pub trait AnalysisStore {
    fn get_analysis(&self, result_id: &str) -> impl Future<Output = Result<AnalysisResult>> + Send;
}

/// Versioned cluster maps per run.
pub trait ClusterMapStore {
    /// Every version saved for the run (any order).
    fn list_cluster_maps(&self, run_id: &str) -> impl Future<Output = Result<Vec<ClusterAssignment>>> + Send;

    /// A specific version, or the newest when `map_id` is `None`.
    fn get_cluster_map(
        &self,
        run_id: &str,
        map_id: Option<&str>,
    ) -> impl Future<Output = Result<ClusterAssignment>> + Send;

    /// Create a new version.
    fn save_cluster_map(
        &self,
        run_id: &str,
        items: Vec<ClusterItem>,
        source: Option<String>,
    ) -> impl Future<Output = Result<ClusterAssignment>> + Send;

    /// Remove one version.
    fn delete_cluster_map(&self, run_id: &str, map_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Newest of a set of versions.
pub(crate) fn newest(versions: Vec<ClusterAssignment>) -> Option<ClusterAssignment> {
    versions.into_iter().max_by_key(|v| v.created_at)
}
