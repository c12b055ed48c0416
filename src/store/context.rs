//! Store Context Module
//!
//! Process-wide owner of the backing-store handle. The handle is built
//! lazily, exactly once, on first use; every cache sharing the context
//! reuses it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{CacheError, Result};
use crate::store::{
    Addressing, FirestoreOptions, FirestoreStore, MemoryCollectionStore, MemoryTreeStore,
    RealtimeDatabaseOptions, RealtimeDatabaseStore, RecordStore,
};

// == Store Config ==
/// Which backing store to build and how.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// In-process flat collection
    MemoryCollection,
    /// In-process tree
    MemoryTree { hash_keys: bool },
    /// Cloud Firestore collection
    Firestore(FirestoreOptions),
    /// Firebase Realtime Database tree
    RealtimeDatabase(RealtimeDatabaseOptions),
}

impl StoreConfig {
    /// Addressing scheme of the store this config builds.
    pub fn addressing(&self) -> Addressing {
        match self {
            StoreConfig::MemoryCollection | StoreConfig::Firestore(_) => Addressing::Collection,
            StoreConfig::MemoryTree { hash_keys } => Addressing::Tree {
                hash_keys: *hash_keys,
            },
            StoreConfig::RealtimeDatabase(options) => Addressing::Tree {
                hash_keys: options.hash_keys,
            },
        }
    }

    fn build(&self) -> Result<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match self {
            StoreConfig::MemoryCollection => Arc::new(MemoryCollectionStore::new()),
            StoreConfig::MemoryTree { hash_keys } => Arc::new(MemoryTreeStore::new(*hash_keys)),
            StoreConfig::Firestore(options) => Arc::new(FirestoreStore::new(options.clone())?),
            StoreConfig::RealtimeDatabase(options) => {
                Arc::new(RealtimeDatabaseStore::new(options.clone())?)
            }
        };
        Ok(store)
    }
}

// == Store Context ==
pub struct StoreContext {
    config: Option<StoreConfig>,
    addressing: Addressing,
    handle: OnceCell<Arc<dyn RecordStore>>,
}

impl StoreContext {
    /// Creates a context that builds its store from `config` on first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            addressing: config.addressing(),
            config: Some(config),
            handle: OnceCell::new(),
        }
    }

    /// Creates a context around an already constructed store.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        Self {
            addressing: store.addressing(),
            config: None,
            handle: OnceCell::new_with(Some(store)),
        }
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Returns true once the store handle exists.
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    // == Store ==
    /// Returns the shared store handle, building it on first call.
    ///
    /// Concurrent first callers wait on the same initialization; a failed
    /// build is not cached, so the next call tries again.
    pub async fn store(&self) -> Result<Arc<dyn RecordStore>> {
        let store = self
            .handle
            .get_or_try_init(|| async {
                let config = self
                    .config
                    .as_ref()
                    .ok_or_else(|| CacheError::Config("no backing store configured".to_string()))?;
                let store = config.build()?;
                info!(store = store.name(), "backing store initialized");
                Ok::<_, CacheError>(store)
            })
            .await?;

        Ok(Arc::clone(store))
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("addressing", &self.addressing)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
