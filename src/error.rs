//! Error types for the document cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::KeyWarning;

// == Cache Error Enum ==
/// Unified error type for the cache and its backing stores.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key rejected by the validator (strict mode only)
    #[error("Invalid cache key: {0}")]
    InvalidKey(KeyWarning),

    /// Value could not be encoded for storage
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Stored payload is corrupt or was written by an incompatible encoder
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Transport, auth or status failure talking to the backing store
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key not found (or expired) in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidKey(_) | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_)
            | CacheError::Deserialization(_)
            | CacheError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
