//! Client for the evaluation dashboard's HTTP API.
//!
//! Implements every store trait against the dashboard endpoints. Transport
//! failures are passed through unchanged as [`ExplorerError::Http`].

use super::{AnalysisStore, ClusterMapStore, RunStore};
use crate::config::ApiConfig;
use crate::error::{ExplorerError, Result};
use crate::model::{AnalysisResult, ClusterAssignment, ClusterItem, RunDetails, RunSummary};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request body for saving a cluster map.
#[derive(Debug, Serialize)]
struct SaveClusterMapRequest<'a> {
    items: &'a [ClusterItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

/// Error body returned by the dashboard API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: serde_json::Value,
}

/// What a 404 from a given endpoint means.
enum Missing<'a> {
    /// The endpoint itself is absent, not an entity behind it.
    Endpoint(&'a str),
    Run(&'a str),
    Analysis(&'a str),
    ClusterMap(&'a str, Option<&'a str>),
}

impl Missing<'_> {
    fn into_error(self) -> ExplorerError {
        match self {
            Missing::Endpoint(name) => ExplorerError::Api(format!("endpoint '{}' not found (404)", name)),
            Missing::Run(id) => ExplorerError::RunNotFound(id.to_string()),
            Missing::Analysis(id) => ExplorerError::AnalysisNotFound(id.to_string()),
            Missing::ClusterMap(run_id, map_id) => ExplorerError::cluster_map_not_found(run_id, map_id),
        }
    }
}

/// HTTP-backed run, analysis and cluster-map store.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    api_key: String,
}

impl ApiClient {
    /// Create a client for the configured dashboard.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base = Url::parse(config.api_base.trim())
            .map_err(|e| ExplorerError::InvalidConfig(format!("invalid api_base '{}': {}", config.api_base, e)))?;
        if base.cannot_be_a_base() {
            return Err(ExplorerError::InvalidConfig(format!(
                "api_base '{}' cannot be used as a base URL",
                config.api_base
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    /// `<base>/api/v1/<segments...>`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    /// Send a request and decode the JSON body.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, missing: Missing<'_>) -> Result<T> {
        let body = self.send_raw(builder, missing).await?;
        serde_json::from_str(&body).map_err(|e| ExplorerError::Serialization(e.to_string()))
    }

    async fn send_raw(&self, builder: RequestBuilder, missing: Missing<'_>) -> Result<String> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!(%url, %status, bytes = body.len(), "dashboard API response");

        if status == StatusCode::NOT_FOUND {
            return Err(missing.into_error());
        }

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
                let detail = match api_error.detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                return Err(ExplorerError::Api(format!("{} ({})", detail, status)));
            }
            return Err(ExplorerError::Api(format!("Request failed ({}): {}", status, body)));
        }

        Ok(body)
    }
}

impl RunStore for ApiClient {
    async fn get_run(&self, run_id: &str) -> Result<RunDetails> {
        let url = self.endpoint(&["runs", run_id]);
        self.send(self.request(Method::GET, url), Missing::Run(run_id)).await
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = self.endpoint(&["runs"]);
        self.send(self.request(Method::GET, url), Missing::Endpoint("runs")).await
    }
}

impl AnalysisStore for ApiClient {
    async fn get_analysis(&self, result_id: &str) -> Result<AnalysisResult> {
        let url = self.endpoint(&["pipeline", "results", result_id]);
        let mut result: AnalysisResult = self
            .send(self.request(Method::GET, url), Missing::Analysis(result_id))
            .await?;
        if result.result_id.is_empty() {
            result.result_id = result_id.to_string();
        }
        Ok(result)
    }
}

impl ClusterMapStore for ApiClient {
    async fn list_cluster_maps(&self, run_id: &str) -> Result<Vec<ClusterAssignment>> {
        let url = self.endpoint(&["runs", run_id, "cluster-maps"]);
        self.send(self.request(Method::GET, url), Missing::Run(run_id)).await
    }

    async fn get_cluster_map(&self, run_id: &str, map_id: Option<&str>) -> Result<ClusterAssignment> {
        let mut url = self.endpoint(&["runs", run_id, "cluster-map"]);
        if let Some(id) = map_id {
            url.query_pairs_mut().append_pair("map_id", id);
        }
        self.send(self.request(Method::GET, url), Missing::ClusterMap(run_id, map_id))
            .await
    }

    async fn save_cluster_map(
        &self,
        run_id: &str,
        items: Vec<ClusterItem>,
        source: Option<String>,
    ) -> Result<ClusterAssignment> {
        let url = self.endpoint(&["runs", run_id, "cluster-map"]);
        let body = SaveClusterMapRequest {
            items: &items,
            source: source.as_deref(),
        };
        self.send(self.request(Method::PUT, url).json(&body), Missing::Run(run_id))
            .await
    }

    async fn delete_cluster_map(&self, run_id: &str, map_id: &str) -> Result<()> {
        let url = self.endpoint(&["runs", run_id, "cluster-maps", map_id]);
        self.send_raw(
            self.request(Method::DELETE, url),
            Missing::ClusterMap(run_id, Some(map_id)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            api_base: base.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_construction() {
        let c = client("http://localhost:8000/");
        assert_eq!(
            c.endpoint(&["runs", "run-1"]).as_str(),
            "http://localhost:8000/api/v1/runs/run-1"
        );

        // Without trailing slash, with a path prefix
        let c = client("https://evals.example.com/dashboard");
        assert_eq!(
            c.endpoint(&["pipeline", "results", "r1"]).as_str(),
            "https://evals.example.com/dashboard/api/v1/pipeline/results/r1"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let c = client("http://localhost:8000");
        assert_eq!(
            c.endpoint(&["runs", "a/b c"]).as_str(),
            "http://localhost:8000/api/v1/runs/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_base_is_rejected() {
        let result = ApiClient::new(&ApiConfig {
            api_base: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ExplorerError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_maps_to_not_found() {
        assert!(Missing::Run("r").into_error().is_not_found());
        assert!(Missing::ClusterMap("r", Some("m")).into_error().is_not_found());

        let err = Missing::Endpoint("runs").into_error();
        assert!(matches!(err, ExplorerError::Api(_)));
        assert!(!err.is_not_found());
    }
}
