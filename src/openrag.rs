//! Client for the hosted knowledge service (OpenRAG): saved knowledge
//! filters and document search, optionally scoped by a filter.
//!
//! Deployments without the feature answer 404; that is reported as
//! [`FilterError::FeatureUnavailable`] so callers can treat it as "no
//! results" rather than a failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::OpenRagConfig;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Result count for document search when the caller does not ask for one.
pub const DEFAULT_DOCUMENT_LIMIT: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Knowledge filters are not available")]
    FeatureUnavailable,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OpenRAG API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeFilter {
    pub filter_id: String,
    pub name: String,
    pub description: String,
    /// Saved query, either a JSON string or an object depending on the
    /// service version. Passed through untouched.
    #[serde(rename = "queryData")]
    pub query_data: Value,
}

/// Wire form; older services send `id`, newer ones `filter_id`.
#[derive(Debug, Deserialize)]
struct RawFilter {
    #[serde(default)]
    filter_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "queryData", alias = "query_data")]
    query_data: Value,
}

impl RawFilter {
    fn into_filter(self) -> Option<KnowledgeFilter> {
        let filter_id = self.filter_id.or(self.id)?;
        Some(KnowledgeFilter {
            filter_id,
            name: self.name,
            description: self.description.unwrap_or_default(),
            query_data: self.query_data,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    filter: Option<RawFilter>,
}

/// A document search, optionally restricted to one knowledge filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSearch {
    pub query: String,
    pub limit: Option<u32>,
    /// Minimum similarity score, 0.0 to 1.0.
    pub score_threshold: Option<f64>,
    pub filter_id: Option<String>,
}

impl DocumentSearch {
    fn body(&self) -> Value {
        let mut body = json!({
            "query": self.query,
            "limit": self.limit.unwrap_or(DEFAULT_DOCUMENT_LIMIT),
            "score_threshold": self.score_threshold.unwrap_or(0.0),
        });
        if let Some(filter_id) = &self.filter_id {
            body["filter_id"] = json!(filter_id);
        }
        body
    }
}

/// One matching chunk of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Deserialize)]
struct DocumentSearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct OpenRagClient {
    http: reqwest::Client,
    config: OpenRagConfig,
}

impl OpenRagClient {
    pub fn new(config: OpenRagConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Search filters by name. An upstream `success: false` yields an empty
    /// list.
    pub async fn search(
        &self,
        query: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<KnowledgeFilter>, FilterError> {
        let body = json!({
            "query": query.unwrap_or(""),
            "limit": limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        });
        let response = self
            .authorized(
                self.http
                    .post(format!("{}/api/v1/knowledge-filters/search", self.config.base_url)),
            )
            .json(&body)
            .send()
            .await?;

        let parsed: SearchResponse = Self::ensure_success(response).await?.json().await?;
        if !parsed.success {
            return Ok(Vec::new());
        }
        Ok(parsed
            .filters
            .into_iter()
            .filter_map(RawFilter::into_filter)
            .collect())
    }

    /// Fetch one filter. Unknown ids yield `None`.
    pub async fn get(&self, filter_id: &str) -> Result<Option<KnowledgeFilter>, FilterError> {
        let response = self
            .authorized(self.http.get(format!(
                "{}/api/v1/knowledge-filters/{}",
                self.config.base_url, filter_id
            )))
            .send()
            .await?;

        let parsed: GetResponse = match Self::ensure_success(response).await {
            Ok(response) => response.json().await?,
            // A missing filter and a missing feature look the same upstream
            Err(FilterError::FeatureUnavailable) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !parsed.success {
            return Ok(None);
        }
        Ok(parsed.filter.and_then(RawFilter::into_filter))
    }

    /// Search ingested documents, scoped to `search.filter_id` when set.
    pub async fn search_documents(
        &self,
        search: &DocumentSearch,
    ) -> Result<Vec<SearchHit>, FilterError> {
        let response = self
            .authorized(
                self.http
                    .post(format!("{}/api/v1/search", self.config.base_url)),
            )
            .json(&search.body())
            .send()
            .await?;

        let parsed: DocumentSearchResponse = Self::ensure_success(response).await?.json().await?;
        Ok(parsed.results)
    }

    // ---- private helpers ----

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, FilterError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FilterError::FeatureUnavailable);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FilterError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// The filter service as seen by handlers.
#[derive(Debug, Clone)]
pub enum FilterService {
    Available(OpenRagClient),
    /// Not configured; behaves like a service without the feature.
    Unavailable,
}

impl FilterService {
    pub fn from_config(config: Option<&OpenRagConfig>) -> Self {
        match config {
            Some(config) => FilterService::Available(OpenRagClient::new(config.clone())),
            None => FilterService::Unavailable,
        }
    }

    pub async fn search(
        &self,
        query: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<KnowledgeFilter>, FilterError> {
        match self {
            FilterService::Available(client) => client.search(query, limit).await,
            FilterService::Unavailable => Err(FilterError::FeatureUnavailable),
        }
    }

    pub async fn get(&self, filter_id: &str) -> Result<Option<KnowledgeFilter>, FilterError> {
        match self {
            FilterService::Available(client) => client.get(filter_id).await,
            FilterService::Unavailable => Err(FilterError::FeatureUnavailable),
        }
    }

    pub async fn search_documents(
        &self,
        search: &DocumentSearch,
    ) -> Result<Vec<SearchHit>, FilterError> {
        match self {
            FilterService::Available(client) => client.search_documents(search).await,
            FilterService::Unavailable => Err(FilterError::FeatureUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_filter_accepts_either_id() {
        let a: RawFilter = serde_json::from_value(json!({
            "filter_id": "f1", "name": "Undead", "description": "d", "queryData": "{\"query\":\"undead\"}"
        }))
        .unwrap();
        let b: RawFilter = serde_json::from_value(json!({ "id": "f2", "name": "Dragons" })).unwrap();

        let a = a.into_filter().unwrap();
        assert_eq!(a.filter_id, "f1");
        assert_eq!(a.query_data, json!("{\"query\":\"undead\"}"));

        let b = b.into_filter().unwrap();
        assert_eq!(b.filter_id, "f2");
        assert_eq!(b.description, "");
        assert_eq!(b.query_data, Value::Null);
    }

    #[test]
    fn test_raw_filter_without_id_is_dropped() {
        let raw: RawFilter = serde_json::from_value(json!({ "name": "Orphan" })).unwrap();
        assert!(raw.into_filter().is_none());
    }

    #[test]
    fn test_filter_serializes_query_data_camel_case() {
        let filter = KnowledgeFilter {
            filter_id: "f1".to_string(),
            name: "Undead".to_string(),
            description: String::new(),
            query_data: json!({ "query": "undead" }),
        };
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["filter_id"], "f1");
        assert_eq!(value["queryData"]["query"], "undead");
    }

    #[test]
    fn test_document_search_body_defaults() {
        let body = DocumentSearch {
            query: "undead".to_string(),
            ..Default::default()
        }
        .body();
        assert_eq!(
            body,
            json!({ "query": "undead", "limit": 10, "score_threshold": 0.0 })
        );

        let scoped = DocumentSearch {
            query: "undead".to_string(),
            limit: Some(3),
            score_threshold: Some(0.5),
            filter_id: Some("f1".to_string()),
        }
        .body();
        assert_eq!(scoped["filter_id"], "f1");
        assert_eq!(scoped["limit"], 3);
        assert_eq!(scoped["score_threshold"], 0.5);
    }

    #[tokio::test]
    async fn test_unconfigured_service_reports_feature_unavailable() {
        let service = FilterService::from_config(None);
        assert!(matches!(
            service.search(None, None).await,
            Err(FilterError::FeatureUnavailable)
        ));
        assert!(matches!(
            service.get("f1").await,
            Err(FilterError::FeatureUnavailable)
        ));
        assert!(matches!(
            service.search_documents(&DocumentSearch::default()).await,
            Err(FilterError::FeatureUnavailable)
        ));
    }
}
