//! Cache Backend Module
//!
//! The operation contract every cache exposes, plus the key-building and
//! timeout-normalization helpers implementations call explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

// == Key Function ==
/// Folds a logical key, key prefix and version into the full cache key.
pub type KeyFunction = Arc<dyn Fn(&str, &str, i64) -> String + Send + Sync>;

/// Default key layout: `{prefix}:{version}:{key}`.
pub fn default_key_function(key: &str, key_prefix: &str, version: i64) -> String {
    format!("{}:{}:{}", key_prefix, version, key)
}

/// Uses the key exactly as given, for hosts that fold prefix and version
/// into keys themselves.
pub fn identity_key_function(key: &str, _key_prefix: &str, _version: i64) -> String {
    key.to_string()
}

// == Timeout ==
/// Requested lifetime of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Use the cache's configured default timeout
    #[default]
    Default,
    /// Never expire
    Never,
    /// Expire this many seconds from now; zero or less expires immediately
    Seconds(i64),
}

impl From<Option<i64>> for Timeout {
    fn from(secs: Option<i64>) -> Self {
        secs.map_or(Timeout::Never, Timeout::Seconds)
    }
}

/// Resolves a [`Timeout`] into seconds-from-now, `None` meaning no expiry.
///
/// A zero timeout becomes `-1` so the entry is dead on arrival.
///
/// # Arguments
/// * `timeout` - Requested timeout
/// * `default_timeout` - The cache's default, `None` for no expiry
pub fn backend_timeout(timeout: Timeout, default_timeout: Option<i64>) -> Option<i64> {
    let secs = match timeout {
        Timeout::Default => default_timeout,
        Timeout::Never => None,
        Timeout::Seconds(secs) => Some(secs),
    };
    secs.map(|secs| if secs == 0 { -1 } else { secs })
}

// == Cache Backend ==
/// Cache operations over arbitrary serde values.
///
/// `version` overrides the cache's default key version when set.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stores `value` unless a live entry already exists. Returns whether it stored.
    async fn add<T>(&self, key: &str, value: &T, timeout: Timeout, version: Option<i64>) -> Result<bool>
    where
        T: Serialize + Sync + ?Sized;

    /// Returns the live value for `key`, or `None` on a miss.
    async fn get<T>(&self, key: &str, version: Option<i64>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Stores `value` unconditionally.
    async fn set<T>(&self, key: &str, value: &T, timeout: Timeout, version: Option<i64>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized;

    /// Resets the expiry of `key` without touching its value.
    async fn touch(&self, key: &str, timeout: Timeout, version: Option<i64>) -> Result<()>;

    /// Removes `key`. Missing keys are not an error.
    async fn delete(&self, key: &str, version: Option<i64>) -> Result<()>;

    /// Returns whether a live entry exists for `key`.
    async fn has_key(&self, key: &str, version: Option<i64>) -> Result<bool>;

    /// Removes every entry in this cache's namespace.
    async fn clear(&self) -> Result<()>;

    // == Provided ==

    /// Like [`CacheBackend::get`] with a fallback for misses.
    async fn get_or<T>(&self, key: &str, default: T, version: Option<i64>) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get(key, version).await?.unwrap_or(default))
    }

    /// Returns the cached value, or computes, adds and returns it.
    ///
    /// If another writer wins the add, their value is returned.
    async fn get_or_set<T, F>(&self, key: &str, default: F, timeout: Timeout, version: Option<i64>) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> T + Send,
    {
        if let Some(value) = self.get(key, version).await? {
            return Ok(value);
        }

        let value = default();
        self.add(key, &value, timeout, version).await?;
        Ok(self.get(key, version).await?.unwrap_or(value))
    }

    /// Fetches several keys, omitting misses from the result.
    async fn get_many<T>(&self, keys: &[&str], version: Option<i64>) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key, version).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Stores several entries with a shared timeout.
    async fn set_many<T>(&self, entries: &[(&str, T)], timeout: Timeout, version: Option<i64>) -> Result<()>
    where
        T: Serialize + Sync,
    {
        for (key, value) in entries {
            self.set(key, value, timeout, version).await?;
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[&str], version: Option<i64>) -> Result<()> {
        for key in keys {
            self.delete(key, version).await?;
        }
        Ok(())
    }
}
