//! Error types for the evaluation explorer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Errors that can occur while loading or persisting evaluation data.
///
/// Comparison outcomes such as "not comparable" are not errors; they are
/// returned as values by the analytics functions.
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The run does not exist in the run store.
    #[error("Run '{0}' not found")]
    RunNotFound(String),

    /// The analysis result does not exist in the analysis store.
    #[error("Analysis result '{0}' not found")]
    AnalysisNotFound(String),

    /// No cluster map matches the run (and map id, if one was given).
    #[error("Cluster map {} not found for run '{run_id}'", describe_map_id(.map_id))]
    ClusterMapNotFound {
        run_id: String,
        map_id: Option<String>,
    },

    /// An id that cannot be used as a store key.
    #[error("Invalid id '{0}': ids must be non-empty and free of path separators")]
    InvalidId(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The dashboard API answered with a non-success status.
    #[error("API error: {0}")]
    Api(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn describe_map_id(map_id: &Option<String>) -> String {
    match map_id {
        Some(id) => format!("'{id}'"),
        None => "(latest)".to_string(),
    }
}

impl ExplorerError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a cluster-map lookup failure.
    pub fn cluster_map_not_found(run_id: &str, map_id: Option<&str>) -> Self {
        Self::ClusterMapNotFound {
            run_id: run_id.to_string(),
            map_id: map_id.map(str::to_string),
        }
    }

    /// Whether this error means "the requested entity does not exist".
    ///
    /// Callers use this to fall back (e.g. clear clustering state) instead of
    /// aborting.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExplorerError::RunNotFound(_)
                | ExplorerError::AnalysisNotFound(_)
                | ExplorerError::ClusterMapNotFound { .. }
        )
    }
}

impl From<reqwest::Error> for ExplorerError {
    fn from(err: reqwest::Error) -> Self {
        ExplorerError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(ExplorerError::RunNotFound("r1".into()).is_not_found());
        assert!(ExplorerError::cluster_map_not_found("r1", Some("m1")).is_not_found());
        assert!(!ExplorerError::Http("down".into()).is_not_found());
        assert!(!ExplorerError::InvalidId("../x".into()).is_not_found());
    }

    #[test]
    fn test_cluster_map_message() {
        let err = ExplorerError::cluster_map_not_found("run-1", None);
        assert_eq!(err.to_string(), "Cluster map (latest) not found for run 'run-1'");

        let err = ExplorerError::cluster_map_not_found("run-1", Some("abc"));
        assert_eq!(err.to_string(), "Cluster map 'abc' not found for run 'run-1'");
    }
}
