//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::cache::Timeout;

/// Request body for PUT /set and POST /add
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `timeout`: Optional lifetime in seconds (cache default if absent)
/// - `no_expiry`: Store without expiry, overrides `timeout`
/// - `version`: Optional key version override
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub no_expiry: bool,
    #[serde(default)]
    pub version: Option<i64>,
}

impl SetRequest {
    pub fn timeout(&self) -> Timeout {
        requested_timeout(self.timeout, self.no_expiry)
    }

    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    /// Store-specific key rules are left to the cache's key validator.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        None
    }
}

/// Request body for POST /touch/:key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TouchRequest {
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub no_expiry: bool,
}

impl TouchRequest {
    pub fn timeout(&self) -> Timeout {
        requested_timeout(self.timeout, self.no_expiry)
    }
}

/// `?version=N` query accepted by the keyed endpoints
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i64>,
}

fn requested_timeout(timeout: Option<i64>, no_expiry: bool) -> Timeout {
    if no_expiry {
        return Timeout::Never;
    }
    timeout.map_or(Timeout::Default, Timeout::Seconds)
}
