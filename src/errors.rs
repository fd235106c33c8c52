//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the alert engine, covering form
//! validation, query-syntax rejection, search-engine transport failures
//! and storage errors with a single conversion-friendly error type.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from all subsystem components
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Validation, Query Syntax, Transport, Storage, API
//!
//! ## Key Features
//! - Query-syntax failures kept distinguishable (parentheses, quotes,
//!   proximity, generic engine rejection) so callers can explain them
//! - Transport failures marked recoverable for log-and-skip handling
//! - Automatic conversion from dependency error types

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, SearchError>;

/// Comprehensive error types for the alert engine
#[derive(Debug, Error)]
pub enum SearchError {
    /// Form validation errors (CleanData stage)
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Full-text query with unbalanced parentheses
    #[error("Query contains unbalanced parentheses: {query}")]
    UnbalancedParentheses { query: String },

    /// Full-text query with an odd number of quote characters
    #[error("Query contains unbalanced quotes: {query}")]
    UnbalancedQuotes { query: String },

    /// Full-text query using an unsupported proximity connector
    #[error("Query contains an unsupported proximity token: {query}")]
    BadProximityQuery { query: String },

    /// The engine rejected the query for a reason we could not classify
    #[error("The search engine rejected the query: {reason}")]
    BadRequest { reason: String },

    /// Engine unreachable, timed out, or the connection dropped
    #[error("Transport error during {operation}: {details}")]
    Transport { operation: String, details: String },

    /// Missing documents or records; a no-op for deletes
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Record serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SearchError {
    /// True for the query-syntax family of failures. Live search turns
    /// these into a 400; alert health-checking flags the alert invalid.
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            SearchError::UnbalancedParentheses { .. }
                | SearchError::UnbalancedQuotes { .. }
                | SearchError::BadProximityQuery { .. }
                | SearchError::BadRequest { .. }
        )
    }

    /// Check if the error is recoverable (log and skip, never propagate
    /// into the indexing pipeline or alert CRUD)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SearchError::Transport { .. } | SearchError::NotFound { .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SearchError::ValidationFailed { .. } => "validation",
            SearchError::UnbalancedParentheses { .. }
            | SearchError::UnbalancedQuotes { .. }
            | SearchError::BadProximityQuery { .. }
            | SearchError::BadRequest { .. } => "query_syntax",
            SearchError::Transport { .. } => "transport",
            SearchError::NotFound { .. } => "not_found",
            SearchError::Config { .. } => "configuration",
            SearchError::Database(_) | SearchError::Serialization(_) => "storage",
            SearchError::Http(_) | SearchError::Json(_) => "http",
            SearchError::Toml(_) => "configuration",
            SearchError::Internal { .. } => "generic",
        }
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

/// Helper macro for validation failures
#[macro_export]
macro_rules! validation_error {
    ($field:expr, $reason:expr) => {
        $crate::errors::SearchError::ValidationFailed {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_are_distinguishable() {
        let err = SearchError::UnbalancedParentheses {
            query: "(Loretta AND Jose".to_string(),
        };
        assert!(err.is_syntax_error());
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "query_syntax");
    }

    #[test]
    fn transport_errors_are_recoverable() {
        let err = SearchError::Transport {
            operation: "percolate".to_string(),
            details: "connection refused".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_syntax_error());
    }
}
