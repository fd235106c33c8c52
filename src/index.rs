//! # Index Client Module
//!
//! ## Purpose
//! The seam between this engine and the search index: an explicitly
//! constructed client handed to the percolator registry and percolation
//! engine at startup, replacing any implicit global connection state.
//!
//! ## Input/Output Specification
//! - **Input**: compiled query documents (JSON), document payloads
//! - **Output**: parsed hits with highlight fragments and aggregations
//! - **Failure semantics**: connection problems surface as recoverable
//!   transport errors; engine 400s are translated into the distinguishable
//!   query-syntax kinds
//!
//! ## Key Features
//! - `IndexClient` trait so tests and alternative engines can stand in
//! - HTTP implementation over the engine's JSON REST interface
//! - Bounded request and connect timeouts from configuration

use crate::config::EngineConfig;
use crate::errors::{Result, SearchError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One document returned by a search or percolation request.
#[derive(Debug, Clone, Default)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
    /// Highlighted fragments keyed by field name
    pub highlight: BTreeMap<String, Vec<String>>,
}

/// Parsed body of a search response.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub aggregations: Option<Value>,
}

/// The query execution interface the engine components depend on.
/// Constructed once at process start and shared.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Execute a search request body against an index.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse>;

    /// Write (or overwrite) a document under an explicit id.
    async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<()>;

    /// Delete a document. Deleting a missing document is a logged no-op.
    async fn delete_document(&self, index: &str, id: &str) -> Result<()>;
}

/// `IndexClient` over the engine's HTTP JSON interface.
pub struct HttpIndexClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIndexClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Classify an engine rejection into the domain's query-syntax kinds by
/// scanning the engine's reason text.
pub fn translate_engine_rejection(query: &str, reason: &str) -> SearchError {
    let lowered = reason.to_lowercase();
    if lowered.contains("parenthes") {
        SearchError::UnbalancedParentheses {
            query: query.to_string(),
        }
    } else if lowered.contains("quote") {
        SearchError::UnbalancedQuotes {
            query: query.to_string(),
        }
    } else if lowered.contains("proximity") {
        SearchError::BadProximityQuery {
            query: query.to_string(),
        }
    } else {
        SearchError::BadRequest {
            reason: reason.to_string(),
        }
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> SearchError {
    SearchError::Transport {
        operation: operation.to_string(),
        details: err.to_string(),
    }
}

fn parse_hit(raw: &Value) -> SearchHit {
    let mut highlight = BTreeMap::new();
    if let Some(fields) = raw.get("highlight").and_then(Value::as_object) {
        for (field, fragments) in fields {
            let fragments = fragments
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            highlight.insert(field.clone(), fragments);
        }
    }
    SearchHit {
        id: raw
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        score: raw.get("_score").and_then(Value::as_f64),
        source: raw.get("_source").cloned().unwrap_or(Value::Null),
        highlight,
    }
}

fn parse_search_response(body: Value) -> SearchResponse {
    let total = body["hits"]["total"]["value"].as_u64().unwrap_or(0);
    let hits = body["hits"]["hits"]
        .as_array()
        .map(|list| list.iter().map(parse_hit).collect())
        .unwrap_or_default();
    SearchResponse {
        total,
        hits,
        aggregations: body.get("aggregations").cloned(),
    }
}

/// Extract the engine's failure reason from an error response body.
fn rejection_reason(body: &Value) -> String {
    body["error"]["root_cause"][0]["reason"]
        .as_str()
        .or_else(|| body["error"]["reason"].as_str())
        .unwrap_or("unclassified engine rejection")
        .to_string()
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.url(&format!("{}/_search", index)))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error("search", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let error_body: Value = response.json().await.unwrap_or(Value::Null);
            let query = body["query"].to_string();
            return Err(translate_engine_rejection(
                &query,
                &rejection_reason(&error_body),
            ));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SearchError::NotFound {
                what: format!("index '{}'", index),
            });
        }
        if !status.is_success() {
            return Err(SearchError::Internal {
                message: format!("Search against '{}' failed with status {}", index, status),
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| transport_error("search", e))?;
        Ok(parse_search_response(parsed))
    }

    async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("{}/_doc/{}", index, id)))
            .json(document)
            .send()
            .await
            .map_err(|e| transport_error("index_document", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let error_body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(translate_engine_rejection(
                &document.to_string(),
                &rejection_reason(&error_body),
            ));
        }
        if !status.is_success() {
            return Err(SearchError::Internal {
                message: format!(
                    "Indexing document '{}' into '{}' failed with status {}",
                    id, index, status
                ),
            });
        }
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("{}/_doc/{}", index, id)))
            .send()
            .await
            .map_err(|e| transport_error("delete_document", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("Document '{}' already absent from '{}'", id, index);
            return Ok(());
        }
        if !status.is_success() {
            return Err(SearchError::Internal {
                message: format!(
                    "Deleting document '{}' from '{}' failed with status {}",
                    id, index, status
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_config(base_url: String) -> EngineConfig {
        EngineConfig {
            base_url,
            request_timeout_seconds: 2,
            connect_timeout_seconds: 1,
        }
    }

    #[tokio::test]
    async fn parses_hits_and_highlights() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oral_arguments/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {
                    "total": { "value": 1 },
                    "hits": [{
                        "_id": "42",
                        "_score": 1.5,
                        "_source": { "caseName": "Smith v. Jones" },
                        "highlight": { "caseName": ["<strong>Smith</strong> v. Jones"] },
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = HttpIndexClient::new(&engine_config(server.uri())).unwrap();
        let response = client
            .search("oral_arguments", &json!({ "query": { "match_all": {} } }))
            .await
            .unwrap();

        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].id, "42");
        assert_eq!(
            response.hits[0].highlight["caseName"],
            vec!["<strong>Smith</strong> v. Jones".to_string()]
        );
    }

    #[tokio::test]
    async fn translates_engine_rejections_into_syntax_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/opinions/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "root_cause": [{ "reason": "Unbalanced parentheses in query" }]
                }
            })))
            .mount(&server)
            .await;

        let client = HttpIndexClient::new(&engine_config(server.uri())).unwrap();
        let err = client
            .search("opinions", &json!({ "query": { "match_all": {} } }))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnbalancedParentheses { .. }));
    }

    #[tokio::test]
    async fn deleting_a_missing_document_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/opinions_percolator/_doc/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpIndexClient::new(&engine_config(server.uri())).unwrap();
        assert!(client
            .delete_document("opinions_percolator", "missing")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn connection_failures_become_transport_errors() {
        // Nothing listens on this port.
        let client =
            HttpIndexClient::new(&engine_config("http://127.0.0.1:59999".to_string())).unwrap();
        let err = client
            .search("opinions", &json!({ "query": { "match_all": {} } }))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Transport { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn unclassifiable_rejections_fall_back_to_bad_request() {
        let err = translate_engine_rejection("q", "something exotic went wrong");
        assert!(matches!(err, SearchError::BadRequest { .. }));
    }
}
