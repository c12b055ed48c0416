//! Configuration Module
//!
//! Loads cache and server settings from environment variables and projects
//! them into the store and cache option types.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::{AddMode, CacheOptions, KeyValidationMode, Protocol, DEFAULT_TIMEOUT_SECS};
use crate::error::{CacheError, Result};
use crate::store::{
    ClientOptions, FirestoreOptions, RealtimeDatabaseOptions, StoreConfig, FIRESTORE_ENDPOINT,
};

// == Backend Kind ==
/// Backing store selected by `CACHE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    MemoryCollection,
    MemoryTree,
    Firestore,
    RealtimeDatabase,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "memory-collection" => Ok(BackendKind::MemoryCollection),
            "memory-tree" => Ok(BackendKind::MemoryTree),
            "firestore" => Ok(BackendKind::Firestore),
            "realtime-database" | "rtdb" => Ok(BackendKind::RealtimeDatabase),
            other => Err(CacheError::Config(format!("unknown cache backend: {}", other))),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    /// Collection name, or root node for tree stores
    pub location: String,
    pub key_prefix: String,
    pub version: i64,
    /// Default timeout in seconds, `None` for no expiry
    pub default_timeout: Option<i64>,
    pub key_validation: KeyValidationMode,
    pub add_mode: AddMode,
    pub protocol: Protocol,
    /// Hash tree-style address keys
    pub hash_keys: bool,
    pub firestore_project_id: Option<String>,
    pub firestore_database: String,
    pub firestore_endpoint: String,
    pub firebase_database_url: Option<String>,
    pub auth_token: Option<String>,
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - memory-collection, memory-tree, firestore or realtime-database
    /// - `CACHE_LOCATION` - Collection name or tree root (default: cache)
    /// - `CACHE_KEY_PREFIX` / `CACHE_VERSION` - Key namespace and version (default: empty / 1)
    /// - `CACHE_DEFAULT_TIMEOUT` - Seconds, or `none` (default: 300)
    /// - `CACHE_KEY_VALIDATION` - warn or strict (default: warn)
    /// - `CACHE_ADD_MODE` - conditional or legacy (default: conditional)
    /// - `CACHE_SERIALIZER` - json or json-deflate (default: json)
    /// - `CACHE_HASH_KEYS` - Hash tree-style keys (default: true)
    /// - `FIRESTORE_PROJECT_ID`, `FIRESTORE_DATABASE`, `FIRESTORE_ENDPOINT`
    /// - `FIREBASE_DATABASE_URL`, `CACHE_AUTH_TOKEN`
    /// - `CACHE_CONNECT_TIMEOUT` / `CACHE_REQUEST_TIMEOUT` - Seconds (default: 10 / 30)
    /// - `CACHE_MAX_RETRIES` / `CACHE_RETRY_BACKOFF_MS` - (default: 2 / 200)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            backend: parsed(&var, "CACHE_BACKEND", defaults.backend),
            location: var("CACHE_LOCATION").unwrap_or(defaults.location),
            key_prefix: lookup("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            version: parsed(&var, "CACHE_VERSION", defaults.version),
            default_timeout: var("CACHE_DEFAULT_TIMEOUT")
                .and_then(|v| parse_timeout(&v))
                .unwrap_or(defaults.default_timeout),
            key_validation: parsed(&var, "CACHE_KEY_VALIDATION", defaults.key_validation),
            add_mode: parsed(&var, "CACHE_ADD_MODE", defaults.add_mode),
            protocol: parsed(&var, "CACHE_SERIALIZER", defaults.protocol),
            hash_keys: parsed(&var, "CACHE_HASH_KEYS", defaults.hash_keys),
            firestore_project_id: var("FIRESTORE_PROJECT_ID"),
            firestore_database: var("FIRESTORE_DATABASE").unwrap_or(defaults.firestore_database),
            firestore_endpoint: var("FIRESTORE_ENDPOINT").unwrap_or(defaults.firestore_endpoint),
            firebase_database_url: var("FIREBASE_DATABASE_URL"),
            auth_token: var("CACHE_AUTH_TOKEN"),
            connect_timeout: parsed(&var, "CACHE_CONNECT_TIMEOUT", defaults.connect_timeout),
            request_timeout: parsed(&var, "CACHE_REQUEST_TIMEOUT", defaults.request_timeout),
            max_retries: parsed(&var, "CACHE_MAX_RETRIES", defaults.max_retries),
            retry_backoff_ms: parsed(&var, "CACHE_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            server_port: parsed(&var, "SERVER_PORT", defaults.server_port),
        }
    }

    // == Projections ==
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Store settings for the selected backend.
    ///
    /// Fails when a remote backend is selected without its required location.
    pub fn store_config(&self) -> Result<StoreConfig> {
        match self.backend {
            BackendKind::MemoryCollection => Ok(StoreConfig::MemoryCollection),
            BackendKind::MemoryTree => Ok(StoreConfig::MemoryTree {
                hash_keys: self.hash_keys,
            }),
            BackendKind::Firestore => {
                let project_id = self.firestore_project_id.clone().ok_or_else(|| {
                    CacheError::Config("FIRESTORE_PROJECT_ID is required for firestore".to_string())
                })?;

                let mut options = FirestoreOptions::new(project_id, self.location.clone());
                options.endpoint = self.firestore_endpoint.clone();
                options.database = self.firestore_database.clone();
                options.bearer_token = self.auth_token.clone();
                options.client = self.client_options();
                Ok(StoreConfig::Firestore(options))
            }
            BackendKind::RealtimeDatabase => {
                let database_url = self.firebase_database_url.clone().ok_or_else(|| {
                    CacheError::Config(
                        "FIREBASE_DATABASE_URL is required for realtime-database".to_string(),
                    )
                })?;

                let mut options = RealtimeDatabaseOptions::new(database_url, self.location.clone());
                options.hash_keys = self.hash_keys;
                options.bearer_token = self.auth_token.clone();
                options.client = self.client_options();
                Ok(StoreConfig::RealtimeDatabase(options))
            }
        }
    }

    /// Cache façade settings.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            key_prefix: self.key_prefix.clone(),
            version: self.version,
            default_timeout: self.default_timeout,
            key_validation: self.key_validation,
            add_mode: self.add_mode,
            protocol: self.protocol,
            ..CacheOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            location: "cache".to_string(),
            key_prefix: String::new(),
            version: 1,
            default_timeout: Some(DEFAULT_TIMEOUT_SECS),
            key_validation: KeyValidationMode::default(),
            add_mode: AddMode::default(),
            protocol: Protocol::default(),
            hash_keys: true,
            firestore_project_id: None,
            firestore_database: "(default)".to_string(),
            firestore_endpoint: FIRESTORE_ENDPOINT.to_string(),
            firebase_database_url: None,
            auth_token: None,
            connect_timeout: 10,
            request_timeout: 30,
            max_retries: 2,
            retry_backoff_ms: 200,
            server_port: 3000,
        }
    }
}

// == Parsing Helpers ==
fn parsed<T, F>(var: &F, name: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "invalid value, using default");
            default
        }),
    }
}

/// Parses a default timeout: whole seconds, or `none` for no expiry.
fn parse_timeout(raw: &str) -> Option<Option<i64>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    match raw.parse() {
        Ok(secs) => Some(Some(secs)),
        Err(_) => {
            warn!(variable = "CACHE_DEFAULT_TIMEOUT", value = %raw, "invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::MemoryCollection);
        assert_eq!(config.location, "cache");
        assert_eq!(config.default_timeout, Some(300));
        assert_eq!(config.server_port, 3000);
        assert!(config.hash_keys);
    }

    #[test]
    fn test_config_from_empty_lookup_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.version, 1);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.firestore_database, "(default)");
        assert_eq!(config.add_mode, AddMode::Conditional);
    }

    #[test]
    fn test_config_reads_values() {
        let config = config_from(&[
            ("CACHE_BACKEND", "memory-tree"),
            ("CACHE_KEY_PREFIX", "tenant"),
            ("CACHE_VERSION", "4"),
            ("CACHE_DEFAULT_TIMEOUT", "none"),
            ("CACHE_KEY_VALIDATION", "strict"),
            ("CACHE_ADD_MODE", "legacy"),
            ("CACHE_SERIALIZER", "json-deflate"),
            ("CACHE_HASH_KEYS", "false"),
            ("SERVER_PORT", "8080"),
        ]);

        assert_eq!(config.backend, BackendKind::MemoryTree);
        assert_eq!(config.key_prefix, "tenant");
        assert_eq!(config.version, 4);
        assert_eq!(config.default_timeout, None);
        assert_eq!(config.key_validation, KeyValidationMode::Strict);
        assert_eq!(config.add_mode, AddMode::Legacy);
        assert_eq!(config.protocol, Protocol::JsonDeflate);
        assert!(!config.hash_keys);
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("CACHE_BACKEND", "redis"),
            ("CACHE_DEFAULT_TIMEOUT", "soon"),
            ("SERVER_PORT", "not-a-port"),
        ]);
        assert_eq!(config.backend, BackendKind::MemoryCollection);
        assert_eq!(config.default_timeout, Some(300));
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_store_config_requires_remote_location() {
        let config = config_from(&[("CACHE_BACKEND", "firestore")]);
        assert!(matches!(config.store_config(), Err(CacheError::Config(_))));

        let config = config_from(&[("CACHE_BACKEND", "realtime-database")]);
        assert!(matches!(config.store_config(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_store_config_firestore() {
        let config = config_from(&[
            ("CACHE_BACKEND", "firestore"),
            ("FIRESTORE_PROJECT_ID", "demo"),
            ("CACHE_LOCATION", "django_cache"),
            ("CACHE_AUTH_TOKEN", "secret"),
            ("CACHE_MAX_RETRIES", "5"),
        ]);

        let Ok(StoreConfig::Firestore(options)) = config.store_config() else {
            panic!("expected firestore store config");
        };
        assert_eq!(options.project_id, "demo");
        assert_eq!(options.collection, "django_cache");
        assert_eq!(options.bearer_token.as_deref(), Some("secret"));
        assert_eq!(options.client.max_retries, 5);
    }

    #[test]
    fn test_cache_options_projection() {
        let config = config_from(&[("CACHE_KEY_PREFIX", "p"), ("CACHE_VERSION", "2")]);
        let options = config.cache_options();
        assert_eq!(options.key_prefix, "p");
        assert_eq!(options.version, 2);
        assert_eq!(options.default_timeout, Some(300));
    }
}
