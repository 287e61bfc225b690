//! Configuration for the evaluation explorer.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{ExplorerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Where run, analysis and cluster-map data live when no API is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the file store (contains `runs/`, `analyses/`, `cluster_maps/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Dashboard API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the dashboard API (e.g., "http://localhost:8000").
    /// Empty means the file store is used instead.
    #[serde(default)]
    pub api_base: String,

    /// Optional bearer token.
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Spatial projection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Threshold splitting the groundedness/relevance plane into quadrants.
    #[serde(default = "default_quadrant_threshold")]
    pub quadrant_threshold: f64,

    /// Optional cluster palette override (hex colors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
}

fn default_quadrant_threshold() -> f64 {
    0.70
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            quadrant_threshold: default_quadrant_threshold(),
            palette: None,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// File store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Dashboard API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Projection settings
    #[serde(default)]
    pub projection: ProjectionConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EVAL_EXPLORER_DATA_DIR, EVAL_EXPLORER_API_BASE, ...)
    /// 2. Config file (~/.config/rag-eval-explorer/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_with_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ExplorerError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ExplorerError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(data_dir) = env::var("EVAL_EXPLORER_DATA_DIR") {
            self.store.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(api_base) = env::var("EVAL_EXPLORER_API_BASE") {
            self.api.api_base = api_base;
        }

        if let Ok(api_key) = env::var("EVAL_EXPLORER_API_KEY") {
            self.api.api_key = api_key;
        }

        if let Ok(timeout) = env::var("EVAL_EXPLORER_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.api.timeout_secs = secs;
            }
        }

        if let Ok(threshold) = env::var("EVAL_EXPLORER_QUADRANT_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.projection.quadrant_threshold = t;
            }
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-eval-explorer")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Whether the dashboard API should be used instead of the file store.
    pub fn uses_api(&self) -> bool {
        !self.api.api_base.trim().is_empty()
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        let t = self.projection.quadrant_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ExplorerError::InvalidConfig(format!(
                "quadrant_threshold must lie in [0, 1], got {}",
                t
            )));
        }

        if let Some(palette) = &self.projection.palette {
            if palette.is_empty() {
                return Err(ExplorerError::InvalidConfig(
                    "palette override must contain at least one color".to_string(),
                ));
            }
        }

        if self.uses_api() && self.api.timeout_secs == 0 {
            return Err(ExplorerError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if !self.uses_api() && self.store.data_dir.as_os_str().is_empty() {
            return Err(ExplorerError::InvalidConfig(
                "Either a data directory or an API base URL is required. Set EVAL_EXPLORER_DATA_DIR or EVAL_EXPLORER_API_BASE.".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config pointing at a file store (useful for testing).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                data_dir: data_dir.into(),
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.data_dir, PathBuf::from("data"));
        assert!(config.api.api_base.is_empty());
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.projection.quadrant_threshold, 0.70);
        assert!(!config.uses_api());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.projection.quadrant_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_palette() {
        let mut config = Config::default();
        config.projection.palette = Some(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "store:\n  data_dir: /tmp/evals\nprojection:\n  quadrant_threshold: 0.6\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/evals"));
        assert_eq!(config.projection.quadrant_threshold, 0.6);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_with_data_dir() {
        let config = Config::with_data_dir("/srv/evals");
        assert_eq!(config.store.data_dir, PathBuf::from("/srv/evals"));
        assert!(!config.uses_api());
    }
}
