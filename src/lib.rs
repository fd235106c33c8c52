//! # Legal Search Alert Engine
//!
//! ## Overview
//! This library implements the search-alert subsystem of a legal research
//! platform: saved searches are compiled into persistent percolator queries,
//! every newly indexed document is matched against them in reverse, and
//! matches become rate-limited email and webhook notifications.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `criteria`: URL-encoded search criteria parsing and form validation
//! - `query`: compilation of validated criteria into engine query documents
//! - `index`: the search-engine client seam (queries, documents, percolation)
//! - `percolator`: percolator registry sync and the inverse-search engine
//! - `store`: persistent alert, scheduled-hit and webhook storage
//! - `dispatch`: rate-aware conversion of percolation matches into notifications
//! - `notify`: outbound email and webhook delivery contracts
//! - `aggregation`: parent grouping and highlight merging for result payloads
//! - `digest`: batched delivery of scheduled (non-real-time) alert hits
//! - `api`: REST endpoints for search, alert CRUD and the post-index hook
//! - `config`: configuration management and settings
//! - `errors`: centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: URL-encoded search criteria, newly indexed documents
//! - **Output**: compiled boolean queries, alert emails, webhook events
//! - **Guarantees**: at-most-once notification per (alert, document) pair
//!
//! ## Usage
//! ```rust,no_run
//! use legal_alerts::{config::Config, criteria::SearchCriteria, query};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let criteria = SearchCriteria::parse("type=oa&q=Smith");
//!     let clean = criteria.validate()?;
//!     let compiled = query::build_compiled_query(&clean, &config.alerts)?;
//!     println!("{}", serde_json::to_string_pretty(&compiled.body())?);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod criteria;
pub mod query;
pub mod index;
pub mod percolator;
pub mod store;
pub mod dispatch;
pub mod notify;
pub mod aggregation;
pub mod digest;
pub mod api;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use criteria::{CleanData, SearchCriteria};
pub use errors::{Result, SearchError};

// Core types used throughout the system
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for alerts
pub type AlertId = Uuid;

/// Unique identifier for users (owned by the external user store)
pub type UserId = Uuid;

/// Engine-assigned document identifier
pub type DocumentId = String;

/// The document types the platform indexes and alerts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchType {
    #[serde(rename = "o")]
    Opinion,
    #[serde(rename = "oa")]
    OralArgument,
    #[serde(rename = "r")]
    Recap,
    #[serde(rename = "p")]
    People,
}

impl SearchType {
    /// The short code used in query strings (`type=oa`)
    pub fn as_code(&self) -> &'static str {
        match self {
            SearchType::Opinion => "o",
            SearchType::OralArgument => "oa",
            SearchType::Recap => "r",
            SearchType::People => "p",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "o" => Some(SearchType::Opinion),
            "oa" => Some(SearchType::OralArgument),
            "r" => Some(SearchType::Recap),
            "p" => Some(SearchType::People),
            _ => None,
        }
    }

    /// Name of the primary index holding documents of this type
    pub fn index_name(&self) -> &'static str {
        match self {
            SearchType::Opinion => "opinions",
            SearchType::OralArgument => "oral_arguments",
            SearchType::Recap => "recap",
            SearchType::People => "people",
        }
    }

    /// Name of the percolator index holding alert queries for this type
    pub fn percolator_index(&self) -> &'static str {
        match self {
            SearchType::Opinion => "opinions_percolator",
            SearchType::OralArgument => "oral_arguments_percolator",
            SearchType::Recap => "recap_percolator",
            SearchType::People => "people_percolator",
        }
    }

    pub fn all() -> [SearchType; 4] {
        [
            SearchType::Opinion,
            SearchType::OralArgument,
            SearchType::Recap,
            SearchType::People,
        ]
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Notification cadence chosen by the alert owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rate {
    #[serde(rename = "rt")]
    RealTime,
    #[serde(rename = "dly")]
    Daily,
    #[serde(rename = "wly")]
    Weekly,
    #[serde(rename = "mly")]
    Monthly,
    #[serde(rename = "off")]
    Off,
}

impl Rate {
    pub fn as_code(&self) -> &'static str {
        match self {
            Rate::RealTime => "rt",
            Rate::Daily => "dly",
            Rate::Weekly => "wly",
            Rate::Monthly => "mly",
            Rate::Off => "off",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "rt" => Some(Rate::RealTime),
            "dly" => Some(Rate::Daily),
            "wly" => Some(Rate::Weekly),
            "mly" => Some(Rate::Monthly),
            "off" => Some(Rate::Off),
            _ => None,
        }
    }

    /// True for the digest rates that accumulate scheduled hits
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Rate::Daily | Rate::Weekly | Rate::Monthly)
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A saved search plus a notification rate, owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub id: AlertId,
    /// Owner of the alert (external user store key)
    pub user_id: UserId,
    /// Owner's email address, denormalized for notification delivery
    pub user_email: String,
    /// A name for the alert
    pub name: String,
    /// The serialized search criteria, URL-encoded
    pub query: String,
    /// The rate chosen by the user for the alert
    pub rate: Rate,
    /// The document type this alert searches, derived from the query string
    pub alert_type: SearchType,
    /// Time of last trigger
    pub date_last_hit: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

impl Alert {
    /// Build a new alert. The search type is always derived from the `type`
    /// parameter of the stored query string so the two can never disagree.
    pub fn new(
        user_id: UserId,
        user_email: impl Into<String>,
        name: impl Into<String>,
        query: impl Into<String>,
        rate: Rate,
    ) -> Self {
        let query = query.into();
        let alert_type = SearchCriteria::peek_search_type(&query);
        Self {
            id: Uuid::new_v4(),
            user_id,
            user_email: user_email.into(),
            name: name.into(),
            query,
            rate,
            alert_type,
            date_last_hit: None,
            date_created: Utc::now(),
        }
    }
}

/// Webhook event families a subscription can listen to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    SearchAlert,
    DocketAlert,
}

/// A user-registered webhook endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub user_id: UserId,
    pub url: String,
    pub event_type: WebhookEventType,
    pub enabled: bool,
    pub version: u32,
}

/// One notification payload handed to the notifier: an alert together with
/// the documents that triggered it. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub alert: Alert,
    pub search_type: SearchType,
    pub documents: Vec<serde_json::Value>,
    pub count: usize,
}

/// Application state shared across components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Config>,
    pub store: Arc<store::AlertStore>,
    pub index: Arc<dyn index::IndexClient>,
    pub registry: Arc<percolator::PercolatorRegistry>,
    pub percolation: Arc<percolator::PercolationEngine>,
    pub dispatcher: Arc<dispatch::AlertDispatcher>,
}
