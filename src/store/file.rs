//! JSON-file-backed stores.
//!
//! Layout under the data directory:
//!
//! ```text
//! runs/<run_id>.json                 RunDetails
//! analyses/<result_id>.json          AnalysisResult
//! cluster_maps/<run_id>/<map_id>.json ClusterAssignment
//! ```

use super::{AnalysisStore, ClusterMapStore, RunStore, newest};
use crate::error::{ExplorerError, Result};
use crate::model::{AnalysisResult, ClusterAssignment, ClusterItem, RunDetails, RunSummary};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory holding run files.
pub const RUNS_DIR: &str = "runs";
/// Directory holding analysis files.
pub const ANALYSES_DIR: &str = "analyses";
/// Directory holding one sub-directory of cluster maps per run.
pub const CLUSTER_MAPS_DIR: &str = "cluster_maps";

/// Stores rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, run_id: &str) -> Option<PathBuf> {
        safe_name(run_id).map(|id| self.root.join(RUNS_DIR).join(format!("{id}.json")))
    }

    fn analysis_path(&self, result_id: &str) -> Option<PathBuf> {
        safe_name(result_id).map(|id| self.root.join(ANALYSES_DIR).join(format!("{id}.json")))
    }

    fn cluster_dir(&self, run_id: &str) -> Option<PathBuf> {
        safe_name(run_id).map(|id| self.root.join(CLUSTER_MAPS_DIR).join(id))
    }

    fn cluster_path(&self, run_id: &str, map_id: &str) -> Option<PathBuf> {
        let dir = self.cluster_dir(run_id)?;
        safe_name(map_id).map(|id| dir.join(format!("{id}.json")))
    }

    /// Write a run file (used to seed a data directory).
    pub async fn put_run(&self, run: &RunDetails) -> Result<()> {
        let path = self
            .run_path(&run.summary.run_id)
            .ok_or_else(|| ExplorerError::InvalidId(run.summary.run_id.clone()))?;
        write_json(&path, run).await
    }

    /// Write an analysis file (used to seed a data directory).
    pub async fn put_analysis(&self, result: &AnalysisResult) -> Result<()> {
        let path = self
            .analysis_path(&result.result_id)
            .ok_or_else(|| ExplorerError::InvalidId(result.result_id.clone()))?;
        write_json(&path, result).await
    }
}

/// Ids become file names; reject anything that could escape the directory.
fn safe_name(id: &str) -> Option<&str> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0']);
    valid.then_some(id)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ExplorerError::io(parent, e))?;
    }

    let data = serde_json::to_vec_pretty(value).map_err(|e| ExplorerError::Serialization(e.to_string()))?;
    fs::write(path, &data).await.map_err(|e| ExplorerError::io(path, e))?;
    debug!(path = %path.display(), bytes = data.len(), "wrote store file");
    Ok(())
}

/// Read and parse a JSON file; `Ok(None)` if it does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ExplorerError::io(path, e)),
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| ExplorerError::Serialization(format!("{}: {}", path.display(), e)))
}

/// JSON files directly inside `dir`, sorted by name.
fn json_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "skipping unreadable store entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect()
}

impl RunStore for FileStore {
    async fn get_run(&self, run_id: &str) -> Result<RunDetails> {
        let path = self
            .run_path(run_id)
            .ok_or_else(|| ExplorerError::RunNotFound(run_id.to_string()))?;
        read_json(&path)
            .await?
            .ok_or_else(|| ExplorerError::RunNotFound(run_id.to_string()))
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        for path in json_files(&self.root.join(RUNS_DIR)) {
            match read_json::<RunDetails>(&path).await {
                Ok(Some(run)) => summaries.push(run.summary),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable run file"),
            }
        }
        Ok(summaries)
    }
}

impl AnalysisStore for FileStore {
    async fn get_analysis(&self, result_id: &str) -> Result<AnalysisResult> {
        let path = self
            .analysis_path(result_id)
            .ok_or_else(|| ExplorerError::AnalysisNotFound(result_id.to_string()))?;
        let mut result: AnalysisResult = read_json(&path)
            .await?
            .ok_or_else(|| ExplorerError::AnalysisNotFound(result_id.to_string()))?;
        if result.result_id.is_empty() {
            result.result_id = result_id.to_string();
        }
        Ok(result)
    }
}

impl ClusterMapStore for FileStore {
    async fn list_cluster_maps(&self, run_id: &str) -> Result<Vec<ClusterAssignment>> {
        let Some(dir) = self.cluster_dir(run_id) else {
            return Ok(Vec::new());
        };

        let mut versions = Vec::new();
        for path in json_files(&dir) {
            match read_json::<ClusterAssignment>(&path).await {
                Ok(Some(assignment)) => versions.push(assignment),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable cluster map"),
            }
        }
        Ok(versions)
    }

    async fn get_cluster_map(&self, run_id: &str, map_id: Option<&str>) -> Result<ClusterAssignment> {
        let not_found = || ExplorerError::cluster_map_not_found(run_id, map_id);
        match map_id {
            Some(id) => {
                let path = self.cluster_path(run_id, id).ok_or_else(not_found)?;
                read_json(&path).await?.ok_or_else(not_found)
            }
            None => newest(self.list_cluster_maps(run_id).await?).ok_or_else(not_found),
        }
    }

    async fn save_cluster_map(
        &self,
        run_id: &str,
        items: Vec<ClusterItem>,
        source: Option<String>,
    ) -> Result<ClusterAssignment> {
        let assignment = ClusterAssignment::new_version(run_id, items, source);
        let path = self
            .cluster_path(run_id, &assignment.map_id)
            .ok_or_else(|| ExplorerError::InvalidId(run_id.to_string()))?;
        write_json(&path, &assignment).await?;
        Ok(assignment)
    }

    async fn delete_cluster_map(&self, run_id: &str, map_id: &str) -> Result<()> {
        let path = self
            .cluster_path(run_id, map_id)
            .ok_or_else(|| ExplorerError::cluster_map_not_found(run_id, Some(map_id)))?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExplorerError::cluster_map_not_found(run_id, Some(map_id)))
            }
            Err(e) => Err(ExplorerError::io(&path, e)),
        }
    }
}
