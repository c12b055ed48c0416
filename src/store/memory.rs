//! In-Memory Stores
//!
//! Process-local stand-ins for the remote document stores. They follow the
//! same write semantics (merge-upsert, partial records on touch) so the
//! cache behaves identically against them, and expose inspection helpers
//! for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{
    clear_by_scan, tree_namespace_node, Addressing, CacheRecord, NamespaceScan, RecordAddress,
    RecordStore,
};

fn upsert(slot: Option<&mut CacheRecord>, record: &CacheRecord, merge: bool) -> Option<CacheRecord> {
    match slot {
        Some(existing) if merge => {
            record.merge_into(existing);
            None
        }
        _ => Some(record.clone()),
    }
}

// == Memory Collection Store ==
/// Flat collection of documents keyed by address key.
#[derive(Debug, Default)]
pub struct MemoryCollectionStore {
    documents: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents, live or not.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Number of documents tagged with `namespace`.
    pub async fn namespace_len(&self, namespace: &str) -> usize {
        self.documents
            .read()
            .await
            .values()
            .filter(|record| record.namespace.as_deref() == Some(namespace))
            .count()
    }

    /// Raw document by address key, bypassing expiry.
    pub async fn document(&self, key: &str) -> Option<CacheRecord> {
        self.documents.read().await.get(key).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryCollectionStore {
    fn name(&self) -> &'static str {
        "memory-collection"
    }

    fn addressing(&self) -> Addressing {
        Addressing::Collection
    }

    async fn put(&self, address: &RecordAddress, record: &CacheRecord, merge: bool) -> Result<()> {
        let mut documents = self.documents.write().await;
        if let Some(replacement) = upsert(documents.get_mut(&address.key), record, merge) {
            documents.insert(address.key.clone(), replacement);
        }
        Ok(())
    }

    async fn fetch(&self, address: &RecordAddress) -> Result<Option<CacheRecord>> {
        Ok(self.documents.read().await.get(&address.key).cloned())
    }

    async fn remove(&self, address: &RecordAddress) -> Result<()> {
        self.documents.write().await.remove(&address.key);
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<Option<u64>> {
        clear_by_scan(self, namespace).await.map(Some)
    }
}

#[async_trait]
impl NamespaceScan for MemoryCollectionStore {
    async fn scan_namespace(&self, namespace: &str) -> Result<BoxStream<'static, Result<String>>> {
        // Snapshot, so removals during consumption never contend with the scan.
        let keys: Vec<Result<String>> = self
            .documents
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.namespace.as_deref() == Some(namespace))
            .map(|(key, _)| Ok(key.clone()))
            .collect();

        Ok(stream::iter(keys).boxed())
    }
}

// == Memory Tree Store ==
/// Tree of records: namespace node, then address key.
#[derive(Debug)]
pub struct MemoryTreeStore {
    hash_keys: bool,
    nodes: RwLock<HashMap<String, HashMap<String, CacheRecord>>>,
}

impl MemoryTreeStore {
    pub fn new(hash_keys: bool) -> Self {
        Self {
            hash_keys,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records under `namespace`.
    pub async fn namespace_len(&self, namespace: &str) -> usize {
        let Ok(node) = tree_namespace_node(namespace) else {
            return 0;
        };
        self.nodes.read().await.get(&node).map_or(0, HashMap::len)
    }

    /// Names of the namespace nodes directly under the root.
    pub async fn namespace_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.nodes.read().await.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Raw record at `address`, bypassing expiry.
    pub async fn record(&self, address: &RecordAddress) -> Option<CacheRecord> {
        let node = tree_namespace_node(&address.namespace).ok()?;
        self.nodes
            .read()
            .await
            .get(&node)
            .and_then(|children| children.get(&address.key))
            .cloned()
    }
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl RecordStore for MemoryTreeStore {
    fn name(&self) -> &'static str {
        "memory-tree"
    }

    fn addressing(&self) -> Addressing {
        Addressing::Tree {
            hash_keys: self.hash_keys,
        }
    }

    async fn put(&self, address: &RecordAddress, record: &CacheRecord, merge: bool) -> Result<()> {
        // Tree records carry no namespace field: the path is the namespace.
        let record = CacheRecord {
            namespace: None,
            ..record.clone()
        };

        let node = tree_namespace_node(&address.namespace)?;
        let mut nodes = self.nodes.write().await;
        let children = nodes.entry(node).or_default();
        if let Some(replacement) = upsert(children.get_mut(&address.key), &record, merge) {
            children.insert(address.key.clone(), replacement);
        }
        Ok(())
    }

    async fn fetch(&self, address: &RecordAddress) -> Result<Option<CacheRecord>> {
        let node = tree_namespace_node(&address.namespace)?;
        Ok(self
            .nodes
            .read()
            .await
            .get(&node)
            .and_then(|children| children.get(&address.key))
            .cloned())
    }

    async fn remove(&self, address: &RecordAddress) -> Result<()> {
        let node = tree_namespace_node(&address.namespace)?;
        let mut nodes = self.nodes.write().await;
        if let Some(children) = nodes.get_mut(&node) {
            children.remove(&address.key);
            if children.is_empty() {
                nodes.remove(&node);
            }
        }
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<Option<u64>> {
        let node = tree_namespace_node(namespace)?;
        let removed = self.nodes.write().await.remove(&node);
        Ok(Some(removed.map_or(0, |children| children.len() as u64)))
    }
}
