//! Error types for poview.
//!
//! A cache miss is never an error: lookups return `Option`. Everything that
//! can actually go wrong (store queries, invalidation, configuration) is a
//! variant of [`PoviewError`].

use thiserror::Error;

/// Main error type for the poview library.
#[derive(Debug, Error)]
pub enum PoviewError {
    // Store errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Entry not found: {key}")]
    EntryNotFound { key: String },

    #[error("Entry already exists: {key}")]
    DuplicateKey { key: String },

    // Cache errors
    #[error("Invalidation failed for {key:?}: {message}")]
    Invalidation { key: Option<String>, message: String },

    #[error("Cache lock poisoned: {0}")]
    LockPoisoned(String),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Request errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for poview operations.
pub type Result<T> = std::result::Result<T, PoviewError>;

impl From<serde_json::Error> for PoviewError {
    fn from(err: serde_json::Error) -> Self {
        PoviewError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PoviewError {
    fn from(err: rusqlite::Error) -> Self {
        PoviewError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PoviewError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        PoviewError::Config {
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Store/database error
    /// - -32002: Entry not found
    /// - -32003: Duplicate entry
    /// - -32005: Validation or configuration error
    /// - -32602: Invalid params
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            PoviewError::Database { .. } => -32000,

            PoviewError::EntryNotFound { .. } => -32002,

            PoviewError::DuplicateKey { .. } => -32003,

            PoviewError::Config { .. } => -32005,

            PoviewError::InvalidParams { .. } | PoviewError::Json { .. } => -32602,

            _ => -32603,
        }
    }

    /// Whether this error leaves the store untouched and the caller may retry.
    ///
    /// The cache layer itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoviewError::Database { .. })
    }
}
