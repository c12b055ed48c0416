//! Store Module
//!
//! Record store adapters for the document cache. Every backend speaks the
//! same [`RecordStore`] contract; they differ only in how records are
//! addressed and how a namespace is cleared.
//!
//! # Backends
//! - [`MemoryCollectionStore`] / [`FirestoreStore`]: flat collection, namespace kept as a field
//! - [`MemoryTreeStore`] / [`RealtimeDatabaseStore`]: tree, namespace is a path prefix

mod client;
mod context;
mod firestore;
mod memory;
mod realtime;
mod record;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CacheError, Result};

pub use client::{ClientOptions, RestClient};
pub use context::{StoreConfig, StoreContext};
pub use firestore::{FirestoreOptions, FirestoreStore, FIRESTORE_ENDPOINT};
pub use memory::{MemoryCollectionStore, MemoryTreeStore};
pub use realtime::{RealtimeDatabaseOptions, RealtimeDatabaseStore};
pub use record::{CacheRecord, RecordAddress};

// == Addressing ==
/// Addressing scheme of a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Flat collection: the address key is the cache key itself
    Collection,
    /// Path tree: the address key is optionally a fixed-width hash
    Tree { hash_keys: bool },
}

impl Addressing {
    /// Derives the address key for a folded cache key.
    ///
    /// Pure: equal inputs always yield the same address.
    pub fn address_key(&self, cache_key: &str) -> String {
        match self {
            Addressing::Collection | Addressing::Tree { hash_keys: false } => cache_key.to_string(),
            Addressing::Tree { hash_keys: true } => hex::encode(Sha256::digest(cache_key.as_bytes())),
        }
    }
}

// == Tree Namespaces ==
/// Path segment holding `namespace` in a tree-style store.
///
/// Every namespace, including the empty one, gets its own node directly
/// under the root, so clearing one namespace never deletes an ancestor of
/// another. The empty namespace maps to `_`; namespaces already starting
/// with `_` gain one more, which keeps the mapping injective.
pub fn tree_namespace_node(namespace: &str) -> Result<String> {
    if let Some(ch) = namespace
        .chars()
        .find(|ch| matches!(ch, '.' | '$' | '#' | '[' | ']' | '/') || ch.is_ascii_control())
    {
        return Err(CacheError::Config(format!(
            "key prefix {:?} cannot be a tree path segment (contains {:?})",
            namespace, ch
        )));
    }

    if namespace.is_empty() || namespace.starts_with('_') {
        Ok(format!("_{}", namespace))
    } else {
        Ok(namespace.to_string())
    }
}

// == Record Store ==
/// CRUD against a single logical record, plus namespace-wide clear.
///
/// Implementations never retry; retry policy belongs to the client they wrap.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn addressing(&self) -> Addressing;

    /// Upserts `record`. With `merge`, fields absent from `record` are kept.
    async fn put(&self, address: &RecordAddress, record: &CacheRecord, merge: bool) -> Result<()>;

    /// Point read.
    async fn fetch(&self, address: &RecordAddress) -> Result<Option<CacheRecord>>;

    /// Idempotent delete.
    async fn remove(&self, address: &RecordAddress) -> Result<()>;

    /// Removes every record in `namespace`. Returns how many were removed,
    /// or `None` when the backend drops the namespace without counting.
    async fn clear_namespace(&self, namespace: &str) -> Result<Option<u64>>;
}

/// Collection-style stores list the documents tagged with a namespace.
#[async_trait]
pub trait NamespaceScan: RecordStore {
    /// Address keys of every record tagged `namespace`.
    ///
    /// The stream is finite and can be consumed once.
    async fn scan_namespace(&self, namespace: &str) -> Result<BoxStream<'static, Result<String>>>;
}

/// Clears a namespace by scanning it and removing records one at a time.
///
/// Not atomic: a failure part way leaves the namespace partially cleared.
pub async fn clear_by_scan<S>(store: &S, namespace: &str) -> Result<u64>
where
    S: NamespaceScan + ?Sized,
{
    let mut keys = store.scan_namespace(namespace).await?;
    let mut removed = 0u64;

    while let Some(key) = keys.next().await {
        store.remove(&RecordAddress::new(namespace, key?)).await?;
        removed += 1;
    }

    debug!(store = store.name(), namespace, removed, "namespace cleared by scan");
    Ok(removed)
}
