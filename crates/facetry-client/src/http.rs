//! HTTP search backend.
//!
//! Posts the rendered DSL body to `{endpoint}/{index}/_search` on an
//! Elasticsearch-compatible server.

use std::sync::Arc;

use async_trait::async_trait;
use facetry_core::Error as CoreError;
use facetry_query::{QueryConfig, SearchBackend, SearchRequest, SearchResponse, dsl};

/// Backend speaking the `_search` HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    endpoint: String,
    config: Arc<QueryConfig>,
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a backend for `endpoint` (scheme, host and optional path
    /// prefix, without a trailing index).
    pub fn new(endpoint: impl Into<String>, config: Arc<QueryConfig>) -> Self {
        Self::with_client(endpoint, config, reqwest::Client::new())
    }

    /// Creates a backend reusing an existing HTTP client.
    pub fn with_client(
        endpoint: impl Into<String>,
        config: Arc<QueryConfig>,
        http_client: reqwest::Client,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            config,
            http_client,
        }
    }

    /// Base URL without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL searched for `request`.
    pub fn search_url(&self, request: &SearchRequest) -> String {
        let index = &self.config.profile(request.result_type).index;
        format!("{}/{}/_search", self.endpoint, index)
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn search(&self, request: SearchRequest) -> facetry_core::Result<SearchResponse> {
        let url = self.search_url(&request);
        let body = dsl::search_body(&request, &self.config);
        log::debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::backend_with_source(format!("request to {url} failed"), e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| {
                CoreError::backend_with_source(format!("reading response from {url} failed"), e)
            })?;

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&bytes);
            return Err(CoreError::backend_with_status(
                status.as_u16(),
                format!("{url} returned {status}: {}", detail.trim()),
            ));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::MalformedResponse(format!("{url}: {e}")))
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Tests
// ============================================================================
