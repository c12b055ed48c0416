//! Document Cache Module
//!
//! The cache façade: folds keys, validates them, encodes values, stamps
//! expiry and drives the record store. Holds no state of its own beyond
//! the shared store context, so clones are cheap and safe to use from
//! many tasks at once.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::backend::{backend_timeout, default_key_function, CacheBackend, KeyFunction, Timeout};
use crate::cache::expiry::{self, Clock, SystemClock};
use crate::cache::{KeyValidationMode, KeyValidator, Protocol, Serializer, DEFAULT_TIMEOUT_SECS};
use crate::error::{CacheError, Result};
use crate::store::{CacheRecord, RecordAddress, StoreContext};

// == Add Mode ==
/// Behaviour of [`CacheBackend::add`] when the key already holds a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Skip the write. Read-then-write, so two racing adds may both store.
    #[default]
    Conditional,
    /// Always write, like `set`
    Legacy,
}

impl FromStr for AddMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conditional" => Ok(AddMode::Conditional),
            "legacy" | "unconditional" => Ok(AddMode::Legacy),
            other => Err(CacheError::Config(format!("unknown add mode: {}", other))),
        }
    }
}

// == Cache Options ==
/// Per-cache settings supplied by the host.
#[derive(Clone)]
pub struct CacheOptions {
    /// Namespace for keys and for `clear`
    pub key_prefix: String,
    /// Default key version
    pub version: i64,
    /// Default timeout in seconds, `None` for no expiry
    pub default_timeout: Option<i64>,
    pub key_validation: KeyValidationMode,
    pub add_mode: AddMode,
    pub protocol: Protocol,
    pub key_function: KeyFunction,
}

impl CacheOptions {
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            version: 1,
            default_timeout: Some(DEFAULT_TIMEOUT_SECS),
            key_validation: KeyValidationMode::default(),
            add_mode: AddMode::default(),
            protocol: Protocol::default(),
            key_function: Arc::new(default_key_function),
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("key_prefix", &self.key_prefix)
            .field("version", &self.version)
            .field("default_timeout", &self.default_timeout)
            .field("key_validation", &self.key_validation)
            .field("add_mode", &self.add_mode)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

// == Document Cache ==
#[derive(Clone)]
pub struct DocumentCache {
    context: Arc<StoreContext>,
    options: Arc<CacheOptions>,
    serializer: Serializer,
    validator: KeyValidator,
    clock: Arc<dyn Clock>,
}

impl DocumentCache {
    /// Creates a cache over the shared store `context`.
    ///
    /// Several caches may share one context; each keeps its own namespace.
    pub fn new(context: Arc<StoreContext>, options: CacheOptions) -> Self {
        Self {
            serializer: Serializer::new(options.protocol),
            validator: KeyValidator::new(context.addressing(), options.key_validation),
            context,
            options: Arc::new(options),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn key_prefix(&self) -> &str {
        &self.options.key_prefix
    }

    pub fn context(&self) -> &Arc<StoreContext> {
        &self.context
    }

    /// Full cache key for `key` under this cache's prefix and version.
    pub fn make_key(&self, key: &str, version: Option<i64>) -> String {
        let version = version.unwrap_or(self.options.version);
        (self.options.key_function)(key, &self.options.key_prefix, version)
    }

    /// Record address `key` maps to. Does not validate.
    pub fn address_for(&self, key: &str, version: Option<i64>) -> RecordAddress {
        let cache_key = self.make_key(key, version);
        RecordAddress::new(
            self.options.key_prefix.clone(),
            self.context.addressing().address_key(&cache_key),
        )
    }

    // == Internals ==
    /// Folds, validates and addresses `key`. Validation runs on the address
    /// key, the string the store actually sees.
    fn prepare(&self, key: &str, version: Option<i64>) -> Result<RecordAddress> {
        let address = self.address_for(key, version);
        self.validator.validate(&address.key)?;
        Ok(address)
    }

    fn expires_at(&self, timeout: Timeout) -> chrono::DateTime<chrono::Utc> {
        let secs = backend_timeout(timeout, self.options.default_timeout);
        expiry::to_absolute(secs, self.clock.now())
    }

    fn is_live(&self, record: &CacheRecord) -> bool {
        expiry::is_live(record.expires, self.clock.now())
    }

    async fn write<T>(&self, address: &RecordAddress, value: &T, timeout: Timeout) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let record = CacheRecord::new(
            self.serializer.encode(value)?,
            self.expires_at(timeout),
            self.options.key_prefix.clone(),
        );
        self.context.store().await?.put(address, &record, true).await
    }
}

impl fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCache")
            .field("context", &self.context)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheBackend for DocumentCache {
    async fn add<T>(&self, key: &str, value: &T, timeout: Timeout, version: Option<i64>) -> Result<bool>
    where
        T: Serialize + Sync + ?Sized,
    {
        let address = self.prepare(key, version)?;

        if self.options.add_mode == AddMode::Conditional {
            let store = self.context.store().await?;
            if let Some(existing) = store.fetch(&address).await? {
                if self.is_live(&existing) {
                    debug!(key = %address.key, "add skipped, live entry present");
                    return Ok(false);
                }
            }
        }

        self.write(&address, value, timeout).await?;
        debug!(key = %address.key, "add stored entry");
        Ok(true)
    }

    async fn get<T>(&self, key: &str, version: Option<i64>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let address = self.prepare(key, version)?;
        let store = self.context.store().await?;

        let Some(record) = store.fetch(&address).await? else {
            debug!(key = %address.key, "cache miss");
            return Ok(None);
        };

        if !self.is_live(&record) {
            store.remove(&address).await?;
            debug!(key = %address.key, expired_at = %record.expires, "expired entry removed on read");
            return Ok(None);
        }

        let Some(encoded) = record.value else {
            warn!(key = %address.key, "entry has no value (touched before it was set), treating as miss");
            return Ok(None);
        };

        match self.serializer.decode(&encoded) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key = %address.key, error = %err, "unreadable cached value, treating as miss");
                Ok(None)
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T, timeout: Timeout, version: Option<i64>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let address = self.prepare(key, version)?;
        self.write(&address, value, timeout).await?;
        debug!(key = %address.key, "set stored entry");
        Ok(())
    }

    async fn touch(&self, key: &str, timeout: Timeout, version: Option<i64>) -> Result<()> {
        let address = self.prepare(key, version)?;
        let record = CacheRecord::expiry_only(self.expires_at(timeout));

        self.context.store().await?.put(&address, &record, true).await?;
        debug!(key = %address.key, expires = %record.expires, "entry touched");
        Ok(())
    }

    async fn delete(&self, key: &str, version: Option<i64>) -> Result<()> {
        let address = self.prepare(key, version)?;
        self.context.store().await?.remove(&address).await?;
        debug!(key = %address.key, "entry deleted");
        Ok(())
    }

    async fn has_key(&self, key: &str, version: Option<i64>) -> Result<bool> {
        let address = self.prepare(key, version)?;
        let record = self.context.store().await?.fetch(&address).await?;
        Ok(record.is_some_and(|record| self.is_live(&record)))
    }

    async fn clear(&self) -> Result<()> {
        let store = self.context.store().await?;
        let namespace = &self.options.key_prefix;
        match store.clear_namespace(namespace).await? {
            Some(removed) => info!(store = store.name(), %namespace, removed, "cache namespace cleared"),
            None => info!(store = store.name(), %namespace, "cache namespace cleared"),
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::expiry::ManualClock;
    use crate::cache::KeyWarning;
    use crate::store::{Addressing, MemoryCollectionStore, MemoryTreeStore, RecordStore};
    use chrono::DateTime;

    const START: i64 = 1_700_000_000;

    struct Fixture {
        store: Arc<MemoryCollectionStore>,
        clock: Arc<ManualClock>,
        cache: DocumentCache,
    }

    fn fixture(options: CacheOptions) -> Fixture {
        let store = Arc::new(MemoryCollectionStore::new());
        let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(START, 0).unwrap()));
        let context = Arc::new(StoreContext::with_store(store.clone()));
        let cache = DocumentCache::new(context, options).with_clock(clock.clone());
        Fixture { store, clock, cache }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let f = fixture(CacheOptions::default());

        f.cache.set("key1", "value1", Timeout::Default, None).await.unwrap();
        let value: Option<String> = f.cache.get("key1", None).await.unwrap();

        assert_eq!(value.as_deref(), Some("value1"));
    }

    #[tokio::test]
    async fn test_get_miss_returns_none() {
        let f = fixture(CacheOptions::default());
        let value: Option<String> = f.cache.get("missing", None).await.unwrap();
        assert!(value.is_none());
        assert_eq!(f.cache.get_or("missing", 7u32, None).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_expired_get_deletes_record() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", "value1", Timeout::Seconds(60), None).await.unwrap();

        f.clock.advance(61);

        let value: Option<String> = f.cache.get("key1", None).await.unwrap();
        assert!(value.is_none());
        assert!(f.store.is_empty().await);
        assert!(!f.cache.has_key("key1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_live_at_exact_expiry() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", &1u8, Timeout::Seconds(60), None).await.unwrap();

        f.clock.advance(60);

        assert_eq!(f.cache.get::<u8>("key1", None).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_has_key_respects_liveness_without_deleting() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", "v", Timeout::Seconds(10), None).await.unwrap();
        assert!(f.cache.has_key("key1", None).await.unwrap());

        f.clock.advance(11);

        assert!(!f.cache.has_key("key1", None).await.unwrap());
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_default_timeout_none_never_expires() {
        let f = fixture(CacheOptions {
            default_timeout: None,
            ..CacheOptions::default()
        });
        f.cache.set("key1", "v", Timeout::Default, None).await.unwrap();

        f.clock.advance(10 * 365 * 24 * 3600);

        assert!(f.cache.has_key("key1", None).await.unwrap());
        let doc = f.store.document(":1:key1").await.unwrap();
        assert!(expiry::is_never(doc.expires));
    }

    #[tokio::test]
    async fn test_zero_timeout_expires_immediately() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", "v", Timeout::Seconds(0), None).await.unwrap();
        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_add() {
        let f = fixture(CacheOptions::default());

        assert!(f.cache.add("key1", "first", Timeout::Seconds(30), None).await.unwrap());
        assert!(!f.cache.add("key1", "second", Timeout::Seconds(30), None).await.unwrap());
        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap().as_deref(), Some("first"));

        f.clock.advance(31);

        assert!(f.cache.add("key1", "third", Timeout::Seconds(30), None).await.unwrap());
        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_legacy_add_overwrites() {
        let f = fixture(CacheOptions {
            add_mode: AddMode::Legacy,
            ..CacheOptions::default()
        });

        assert!(f.cache.add("key1", "first", Timeout::Default, None).await.unwrap());
        assert!(f.cache.add("key1", "second", Timeout::Default, None).await.unwrap());
        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_touch_updates_only_expiry() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", "value1", Timeout::Seconds(10), None).await.unwrap();

        f.cache.touch("key1", Timeout::Seconds(60), None).await.unwrap();
        f.clock.advance(30);

        let doc = f.store.document(":1:key1").await.unwrap();
        assert_eq!(doc.expires.timestamp(), START + 60);
        assert_eq!(doc.namespace.as_deref(), Some(""));
        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap().as_deref(), Some("value1"));
    }

    #[tokio::test]
    async fn test_touch_missing_key_leaves_partial_record_that_reads_as_miss() {
        let f = fixture(CacheOptions::default());

        f.cache.touch("ghost", Timeout::Seconds(60), None).await.unwrap();

        assert_eq!(f.store.len().await, 1);
        assert!(f.cache.has_key("ghost", None).await.unwrap());
        assert_eq!(f.cache.get::<String>("ghost", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_a_miss() {
        let f = fixture(CacheOptions::default());
        let address = f.cache.address_for("key1", None);
        let record = CacheRecord::new("not-a-frame".into(), expiry::never(), "");
        f.store.put(&address, &record, false).await.unwrap();

        assert_eq!(f.cache.get::<String>("key1", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let f = fixture(CacheOptions::default());
        f.cache.delete("never-set", None).await.unwrap();
        assert!(f.store.is_empty().await);

        f.cache.set("key1", "v", Timeout::Default, None).await.unwrap();
        f.cache.delete("key1", None).await.unwrap();
        f.cache.delete("key1", None).await.unwrap();
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_versions_are_distinct_entries() {
        let f = fixture(CacheOptions::default());
        f.cache.set("key1", "v1", Timeout::Default, Some(1)).await.unwrap();
        f.cache.set("key1", "v2", Timeout::Default, Some(2)).await.unwrap();

        assert_eq!(f.cache.get::<String>("key1", Some(1)).await.unwrap().as_deref(), Some("v1"));
        assert_eq!(f.cache.get::<String>("key1", Some(2)).await.unwrap().as_deref(), Some("v2"));
        assert_eq!(f.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_strict_mode_blocks_invalid_key() {
        let f = fixture(CacheOptions {
            key_validation: KeyValidationMode::Strict,
            ..CacheOptions::default()
        });

        let result = f.cache.set("a/b", "v", Timeout::Default, None).await;
        assert!(matches!(result, Err(CacheError::InvalidKey(KeyWarning::ForwardSlash(_)))));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_custom_key_function() {
        let f = fixture(CacheOptions {
            key_prefix: "site".into(),
            key_function: Arc::new(|key: &str, prefix: &str, version: i64| {
                format!("{}-{}-{}", prefix, key, version)
            }),
            ..CacheOptions::default()
        });

        f.cache.set("home", "html", Timeout::Default, None).await.unwrap();
        assert!(f.store.document("site-home-1").await.is_some());
    }

    #[tokio::test]
    async fn test_tree_addressing_hashes_keys() {
        let store = Arc::new(MemoryTreeStore::new(true));
        let context = Arc::new(StoreContext::with_store(store.clone()));
        let cache = DocumentCache::new(context, CacheOptions::default().with_key_prefix("tenant"));

        cache.set("key.with.dots", "v", Timeout::Default, None).await.unwrap();

        let address = cache.address_for("key.with.dots", None);
        assert_eq!(address.namespace, "tenant");
        assert_eq!(address.key, Addressing::Tree { hash_keys: true }.address_key("tenant:1:key.with.dots"));
        assert!(store.record(&address).await.is_some());
        assert_eq!(cache.get::<String>("key.with.dots", None).await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_get_or_set_computes_once() {
        let f = fixture(CacheOptions::default());

        let first: u32 = f.cache.get_or_set("n", || 1, Timeout::Default, None).await.unwrap();
        let second: u32 = f.cache.get_or_set("n", || 2, Timeout::Default, None).await.unwrap();

        assert_eq!((first, second), (1, 1));
    }

    #[tokio::test]
    async fn test_many_helpers() {
        let f = fixture(CacheOptions::default());
        f.cache
            .set_many(&[("a", 1u32), ("b", 2u32)], Timeout::Default, None)
            .await
            .unwrap();

        let found = f.cache.get_many::<u32>(&["a", "b", "c"], None).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], 2);

        f.cache.delete_many(&["a", "b"], None).await.unwrap();
        assert!(f.store.is_empty().await);
    }

    #[test]
    fn test_add_mode_from_str() {
        assert_eq!("legacy".parse::<AddMode>().unwrap(), AddMode::Legacy);
        assert_eq!("Conditional".parse::<AddMode>().unwrap(), AddMode::Conditional);
        assert!("maybe".parse::<AddMode>().is_err());
    }
}
