//! # Percolator Module
//!
//! ## Purpose
//! Keeps one compiled query per alert synchronized in the percolator
//! indexes, and runs the inverse-search operation: matching one newly
//! indexed document against every registered alert query.
//!
//! ## Input/Output Specification
//! - **Input**: alerts (registry sync), freshly indexed document ids
//! - **Output**: percolator entries in the index; match lists with
//!   ready-to-render highlight fragments
//! - **Failure semantics**: registry sync and percolation are best-effort;
//!   engine failures are logged and never break alert CRUD or indexing
//!
//! ## Key Features
//! - One percolator index per document type; all types percolate
//! - Matches are drained page by page past the engine's response cap
//! - Alert-flavored highlighting travels with each match

use crate::config::AlertsConfig;
use crate::criteria::SearchCriteria;
use crate::errors::Result;
use crate::index::{IndexClient, SearchHit};
use crate::{query, Alert, AlertId, SearchType};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Maintains the percolator indexes in lockstep with the alert store's
/// lifecycle: one stored entry per alert, keyed by alert id.
pub struct PercolatorRegistry {
    index: Arc<dyn IndexClient>,
}

impl PercolatorRegistry {
    pub fn new(index: Arc<dyn IndexClient>) -> Self {
        Self { index }
    }

    /// Compile the alert's stored criteria into the percolator entry
    /// document. Sorting keys are stripped first: a sort directive inside
    /// a percolator query breaks percolation.
    fn build_entry(alert: &Alert) -> Result<Value> {
        let criteria = SearchCriteria::parse(&alert.query).without("order_by");
        let clean = criteria.validate()?;
        let percolator_query = query::build_percolator_query(&clean)?;
        Ok(json!({
            "rate": alert.rate,
            "search_type": alert.alert_type,
            "percolator_query": percolator_query,
        }))
    }

    /// Store (or replace) the alert's percolator entry. Best-effort: any
    /// failure is logged with the offending query and swallowed, so alert
    /// CRUD always succeeds. Returns whether the entry was written.
    pub async fn upsert(&self, alert: &Alert) -> bool {
        let entry = match Self::build_entry(alert) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    "The query '{}' associated with alert {} is invalid and was not indexed: {}",
                    alert.query,
                    alert.id,
                    e
                );
                return false;
            }
        };

        let index_name = alert.alert_type.percolator_index();
        match self
            .index
            .index_document(index_name, &alert.id.to_string(), &entry)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Failed to sync alert {} into '{}' (query: '{}'): {}",
                    alert.id,
                    index_name,
                    alert.query,
                    e
                );
                false
            }
        }
    }

    /// Remove the alert's percolator entry. Deleting a missing entry is
    /// informational only; transport failures are logged and swallowed.
    pub async fn delete(&self, alert_id: AlertId, alert_type: SearchType) {
        let index_name = alert_type.percolator_index();
        if let Err(e) = self
            .index
            .delete_document(index_name, &alert_id.to_string())
            .await
        {
            tracing::warn!(
                "Failed to remove alert {} from '{}': {}",
                alert_id,
                index_name,
                e
            );
        }
    }
}

/// One alert whose stored query matched a percolated document.
#[derive(Debug, Clone)]
pub struct PercolatorMatch {
    pub alert_id: AlertId,
    /// Highlighted fragments from the alert highlighting configuration,
    /// keyed by field
    pub highlights: BTreeMap<String, Vec<String>>,
}

impl PercolatorMatch {
    fn from_hit(hit: &SearchHit) -> Option<Self> {
        match Uuid::parse_str(&hit.id) {
            Ok(alert_id) => Some(Self {
                alert_id,
                highlights: hit.highlight.clone(),
            }),
            Err(_) => {
                tracing::warn!("Percolator hit with non-uuid id '{}' skipped", hit.id);
                None
            }
        }
    }
}

/// The inverse-search operation: given one newly indexed document, return
/// the set of registered alert queries it matches.
pub struct PercolationEngine {
    index: Arc<dyn IndexClient>,
    config: AlertsConfig,
}

impl PercolationEngine {
    pub fn new(index: Arc<dyn IndexClient>, config: AlertsConfig) -> Self {
        Self { index, config }
    }

    fn request_body(
        search_type: SearchType,
        document_id: &str,
        document_index: &str,
        from: usize,
        size: usize,
    ) -> Value {
        json!({
            "query": {
                "percolate": {
                    "field": "percolator_query",
                    "index": document_index,
                    "id": document_id,
                }
            },
            "highlight": query::highlight::build_highlight_options(search_type, true),
            "_source": { "excludes": ["percolator_query"] },
            "from": from,
            "size": size,
        })
    }

    /// Match one indexed document against every registered alert query of
    /// its type, draining additional pages until all matches are
    /// retrieved. Triggered synchronously by the post-index hook.
    ///
    /// Transport and request errors yield an empty (or partial) match
    /// list: percolation for this document is skipped, not retried.
    pub async fn percolate(
        &self,
        search_type: SearchType,
        document_id: &str,
        document_index: &str,
    ) -> Vec<PercolatorMatch> {
        let percolator_index = search_type.percolator_index();
        let page_size = self.config.percolator_page_size;
        let mut matches: Vec<PercolatorMatch> = Vec::new();
        let mut from = 0;

        loop {
            let body =
                Self::request_body(search_type, document_id, document_index, from, page_size);
            let response = match self.index.search(percolator_index, &body).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        "Error percolating document {} from index {}: {}",
                        document_id,
                        document_index,
                        e
                    );
                    return matches;
                }
            };

            let returned = response.hits.len();
            matches.extend(response.hits.iter().filter_map(PercolatorMatch::from_hit));

            from += returned;
            if from as u64 >= response.total || returned == 0 {
                break;
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SearchError;
    use crate::index::SearchResponse;
    use crate::Rate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted index client: pops one canned result per call.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<SearchResponse>>>,
        search_calls: AtomicUsize,
        indexed: Mutex<Vec<(String, String, Value)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<SearchResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                search_calls: AtomicUsize::new(0),
                indexed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IndexClient for ScriptedClient {
        async fn search(&self, _index: &str, _body: &Value) -> Result<SearchResponse> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(SearchResponse::default());
            }
            responses.remove(0)
        }

        async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<()> {
            self.indexed
                .lock()
                .unwrap()
                .push((index.to_string(), id.to_string(), document.clone()));
            Ok(())
        }

        async fn delete_document(&self, _index: &str, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score: Some(1.0),
            source: Value::Null,
            highlight: BTreeMap::new(),
        }
    }

    fn alerts_config(page_size: usize) -> AlertsConfig {
        AlertsConfig {
            percolator_page_size: page_size,
            top_hits_default: 5,
            top_hits_single_group: 100,
            scheduled_hit_retention_days: 90,
        }
    }

    #[tokio::test]
    async fn transport_failure_yields_empty_match_list() {
        let client = Arc::new(ScriptedClient::new(vec![Err(SearchError::Transport {
            operation: "search".to_string(),
            details: "connection refused".to_string(),
        })]));
        let engine = PercolationEngine::new(client.clone(), alerts_config(100));

        let matches = engine
            .percolate(SearchType::OralArgument, "doc-1", "oral_arguments")
            .await;
        assert!(matches.is_empty());

        // A subsequent call against a healthy connection succeeds normally.
        let alert_id = Uuid::new_v4();
        let healthy = Arc::new(ScriptedClient::new(vec![Ok(SearchResponse {
            total: 1,
            hits: vec![hit(&alert_id.to_string())],
            aggregations: None,
        })]));
        let engine = PercolationEngine::new(healthy, alerts_config(100));
        let matches = engine
            .percolate(SearchType::OralArgument, "doc-1", "oral_arguments")
            .await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].alert_id, alert_id);
    }

    #[tokio::test]
    async fn drains_matches_past_the_page_size() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(SearchResponse {
                total: 3,
                hits: vec![hit(&ids[0].to_string()), hit(&ids[1].to_string())],
                aggregations: None,
            }),
            Ok(SearchResponse {
                total: 3,
                hits: vec![hit(&ids[2].to_string())],
                aggregations: None,
            }),
        ]));
        let engine = PercolationEngine::new(client.clone(), alerts_config(2));

        let matches = engine
            .percolate(SearchType::OralArgument, "doc-1", "oral_arguments")
            .await;
        assert_eq!(matches.len(), 3);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_uuid_percolator_hits_are_skipped() {
        let alert_id = Uuid::new_v4();
        let client = Arc::new(ScriptedClient::new(vec![Ok(SearchResponse {
            total: 2,
            hits: vec![hit("not-a-uuid"), hit(&alert_id.to_string())],
            aggregations: None,
        })]));
        let engine = PercolationEngine::new(client, alerts_config(100));
        let matches = engine
            .percolate(SearchType::OralArgument, "doc-1", "oral_arguments")
            .await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].alert_id, alert_id);
    }

    #[tokio::test]
    async fn upsert_stores_entry_without_sorting_keys() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let registry = PercolatorRegistry::new(client.clone());
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "smith oa",
            "type=oa&q=Smith&order_by=dateArgued+desc",
            Rate::RealTime,
        );

        assert!(registry.upsert(&alert).await);
        let indexed = client.indexed.lock().unwrap();
        let (index_name, id, entry) = &indexed[0];
        assert_eq!(index_name, "oral_arguments_percolator");
        assert_eq!(id, &alert.id.to_string());
        assert_eq!(entry["rate"], "rt");
        assert!(entry["percolator_query"]["bool"].is_object());
        // No sort directive survives into the stored entry.
        assert!(entry["percolator_query"].get("sort").is_none());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_entry_content() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let registry = PercolatorRegistry::new(client.clone());
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "smith oa",
            "type=oa&q=Smith",
            Rate::Daily,
        );

        registry.upsert(&alert).await;
        registry.upsert(&alert).await;
        let indexed = client.indexed.lock().unwrap();
        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed[0].2, indexed[1].2);
    }

    #[tokio::test]
    async fn invalid_queries_are_logged_and_skipped() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let registry = PercolatorRegistry::new(client.clone());
        let alert = Alert::new(
            Uuid::new_v4(),
            "owner@example.com",
            "broken",
            "type=oa&q=unterminated+%28paren",
            Rate::RealTime,
        );

        // The save path must not fail even though the query cannot compile.
        assert!(!registry.upsert(&alert).await);
        assert!(client.indexed.lock().unwrap().is_empty());
    }
}
