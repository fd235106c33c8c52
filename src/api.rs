//! # API Server Module
//!
//! ## Purpose
//! REST surface for the alert engine: live search, alert CRUD (which
//! keeps the percolator registry synchronized through explicit calls,
//! not framework signals), webhook registration, and the post-index hook
//! the indexing pipeline invokes for every newly written document.
//!
//! ## Input/Output Specification
//! - **Input**: HTTP requests carrying URL-encoded criteria and documents
//! - **Output**: JSON responses with results, alerts and dispatch summaries
//! - **Errors**: query-syntax and validation failures map to 400, engine
//!   outages to 503, missing records to 404

use crate::aggregation;
use crate::criteria::{AlertRequest, SearchCriteria};
use crate::errors::{Result, SearchError};
use crate::index::SearchHit;
use crate::query::{self, sorting};
use crate::{Alert, AppState, WebhookSubscription};
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Application server wrapping the shared state
pub struct ApiServer {
    app_state: AppState,
}

/// Live search request payload
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// URL-encoded search criteria, the same grammar the search form submits
    pub query: String,
}

/// Document indexing request: the post-index hook payload
#[derive(Debug, Deserialize)]
pub struct IndexDocumentRequest {
    pub id: String,
    pub document: Value,
}

/// Search response payload
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: u64,
    pub results: Vec<Value>,
    pub query_time_ms: u64,
}

impl ApiServer {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }

    /// Run the API server until the process is stopped.
    pub async fn run(self) -> Result<()> {
        let config = self.app_state.config.clone();
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let enable_cors = config.server.enable_cors;
        let app_state = self.app_state.clone();

        tracing::info!("Starting API server on {}", bind_addr);

        let server = HttpServer::new(move || {
            let cors = if enable_cors {
                Cors::permissive()
            } else {
                Cors::default()
            };
            App::new()
                .wrap(cors)
                .app_data(web::Data::new(app_state.clone()))
                .route("/search", web::post().to(search_handler))
                .route("/alerts", web::post().to(create_alert_handler))
                .route("/alerts/{id}", web::put().to(update_alert_handler))
                .route("/alerts/{id}", web::delete().to(delete_alert_handler))
                .route("/webhooks", web::post().to(register_webhook_handler))
                .route("/documents/{type}", web::post().to(index_document_handler))
                .route("/health", web::get().to(health_handler))
                .route("/stats", web::get().to(stats_handler))
        })
        .workers(config.performance.worker_threads)
        .bind(&bind_addr)
        .map_err(|e| SearchError::Internal {
            message: format!("Failed to bind server to {}: {}", bind_addr, e),
        })?
        .run();

        server.await.map_err(|e| SearchError::Internal {
            message: format!("Server error: {}", e),
        })?;

        Ok(())
    }
}

/// Map an engine error onto the HTTP response the caller should see.
fn error_response(error: &SearchError) -> HttpResponse {
    let body = json!({
        "error": error.category(),
        "message": error.to_string(),
    });
    if error.is_syntax_error() || matches!(error, SearchError::ValidationFailed { .. }) {
        HttpResponse::BadRequest().json(body)
    } else if matches!(error, SearchError::NotFound { .. }) {
        HttpResponse::NotFound().json(body)
    } else if matches!(error, SearchError::Transport { .. }) {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::InternalServerError().json(body)
    }
}

/// Merge highlights and backfilled fields into raw hits for rendering.
fn render_hits(app_state: &AppState, hits: &[SearchHit]) -> Result<Vec<Value>> {
    let mut documents: Vec<Value> = Vec::new();
    for hit in hits {
        let mut document = hit.source.clone();
        aggregation::merge_highlights(&mut document, &hit.highlight);
        documents.push(document);
    }

    aggregation::convert_date_strings(&mut documents, &["dateFiled", "dateArgued", "dob"]);

    let court_ids: Vec<String> = documents
        .iter()
        .filter_map(|document| document["court_id"].as_str().map(str::to_string))
        .collect();
    let courts = app_state.store.court_names(&court_ids)?;
    aggregation::merge_court_names(&mut documents, &courts);

    Ok(documents)
}

/// Live search: validate, compile, execute, post-process.
async fn search_handler(
    app_state: web::Data<AppState>,
    request: web::Json<SearchRequest>,
) -> ActixResult<HttpResponse> {
    let timer = crate::utils::Timer::new("live_search");

    let clean = match SearchCriteria::parse(&request.query).validate() {
        Ok(clean) => clean,
        Err(e) => return Ok(error_response(&e)),
    };
    let compiled = match query::build_compiled_query(&clean, &app_state.config.alerts) {
        Ok(compiled) => compiled,
        Err(e) => return Ok(error_response(&e)),
    };

    let response = match app_state
        .index
        .search(clean.search_type.index_name(), &compiled.body())
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Live search failed: {}", e);
            return Ok(error_response(&e));
        }
    };

    let results = match query::group_field_for(clean.search_type) {
        Some(group_field) => {
            let window = compiled
                .top_hits_window
                .unwrap_or(app_state.config.alerts.top_hits_default);
            let order = sorting::sort_field_and_order(&clean);
            let groups =
                aggregation::group_by_parent(&response.hits, group_field, window, order);
            let mut rendered_groups = Vec::new();
            for group in &groups {
                let hits = match render_hits(&app_state, &group.top_hits) {
                    Ok(hits) => hits,
                    Err(e) => return Ok(error_response(&e)),
                };
                rendered_groups.push(json!({
                    "group_key": group.group_key,
                    "max_sort_value": group.max_sort_value,
                    "hits": hits,
                }));
            }
            rendered_groups
        }
        None => match render_hits(&app_state, &response.hits) {
            Ok(hits) => hits,
            Err(e) => return Ok(error_response(&e)),
        },
    };

    Ok(HttpResponse::Ok().json(SearchResponse {
        total: response.total,
        results,
        query_time_ms: timer.elapsed_ms(),
    }))
}

/// Create an alert and sync its percolator entry (best-effort).
async fn create_alert_handler(
    app_state: web::Data<AppState>,
    request: web::Json<AlertRequest>,
) -> ActixResult<HttpResponse> {
    // Reject alerts whose criteria cannot validate; an alert that can
    // never compile would silently produce zero results forever.
    if let Err(e) = SearchCriteria::parse(&request.query).validate() {
        return Ok(error_response(&e));
    }

    let alert = Alert::new(
        request.user_id,
        request.user_email.clone(),
        request.name.clone(),
        request.query.clone(),
        request.rate,
    );
    if let Err(e) = app_state.store.save_alert(&alert) {
        return Ok(error_response(&e));
    }
    let synced = app_state.registry.upsert(&alert).await;

    Ok(HttpResponse::Created().json(json!({
        "alert": alert,
        "percolator_synced": synced,
    })))
}

/// Update an alert in place and re-sync its percolator entry.
async fn update_alert_handler(
    app_state: web::Data<AppState>,
    path: web::Path<Uuid>,
    request: web::Json<AlertRequest>,
) -> ActixResult<HttpResponse> {
    let alert_id = path.into_inner();
    let existing = match app_state.store.get_alert(alert_id) {
        Ok(Some(alert)) => alert,
        Ok(None) => {
            return Ok(error_response(&SearchError::NotFound {
                what: format!("alert '{}'", alert_id),
            }))
        }
        Err(e) => return Ok(error_response(&e)),
    };

    if let Err(e) = SearchCriteria::parse(&request.query).validate() {
        return Ok(error_response(&e));
    }

    let previous_type = existing.alert_type;
    let mut alert = existing;
    alert.name = request.name.clone();
    alert.query = request.query.clone();
    alert.rate = request.rate;
    alert.alert_type = SearchCriteria::peek_search_type(&alert.query);

    if let Err(e) = app_state.store.save_alert(&alert) {
        return Ok(error_response(&e));
    }
    // A type change moves the entry between percolator indexes.
    if previous_type != alert.alert_type {
        app_state.registry.delete(alert.id, previous_type).await;
    }
    let synced = app_state.registry.upsert(&alert).await;

    Ok(HttpResponse::Ok().json(json!({
        "alert": alert,
        "percolator_synced": synced,
    })))
}

/// Delete an alert and remove its percolator entry.
async fn delete_alert_handler(
    app_state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let alert_id = path.into_inner();
    match app_state.store.delete_alert(alert_id) {
        Ok(Some(alert)) => {
            app_state.registry.delete(alert.id, alert.alert_type).await;
            Ok(HttpResponse::NoContent().finish())
        }
        Ok(None) => Ok(error_response(&SearchError::NotFound {
            what: format!("alert '{}'", alert_id),
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Register a webhook subscription for a user.
async fn register_webhook_handler(
    app_state: web::Data<AppState>,
    request: web::Json<WebhookSubscription>,
) -> ActixResult<HttpResponse> {
    match app_state.store.save_webhook(&request) {
        Ok(()) => Ok(HttpResponse::Created().json(&*request)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// The post-index hook: write the document into the engine, then
/// immediately percolate it against every registered alert query and
/// dispatch the matches. Percolation failures degrade to "no matches" and
/// never fail the indexing call.
async fn index_document_handler(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
    request: web::Json<IndexDocumentRequest>,
) -> ActixResult<HttpResponse> {
    let Some(search_type) = crate::SearchType::from_code(&path.into_inner()) else {
        return Ok(error_response(&SearchError::ValidationFailed {
            field: "type".to_string(),
            reason: "Unknown document type".to_string(),
        }));
    };

    let index_name = search_type.index_name();
    if let Err(e) = app_state
        .index
        .index_document(index_name, &request.id, &request.document)
        .await
    {
        tracing::warn!("Indexing document '{}' failed: {}", request.id, e);
        return Ok(error_response(&e));
    }

    let matches = app_state
        .percolation
        .percolate(search_type, &request.id, index_name)
        .await;
    let summary = app_state
        .dispatcher
        .dispatch(&matches, &request.document)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "indexed": request.id,
        "matches": matches.len(),
        "dispatch": summary,
    })))
}

/// Health check endpoint handler
async fn health_handler(app_state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let storage_status = match app_state.store.health_check() {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let status = if storage_status == "healthy" {
        "healthy"
    } else {
        "unhealthy"
    };
    Ok(HttpResponse::Ok().json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "components": {
            "storage": storage_status,
        },
    })))
}

/// Statistics endpoint handler
async fn stats_handler(app_state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "storage": app_state.store.stats(),
    })))
}
