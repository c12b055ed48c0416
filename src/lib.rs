//! docstore_cache - A TTL cache over remote document stores
//!
//! Stores serialized values with absolute expiry instants in a Firestore
//! collection, a Firebase Realtime Database tree or an in-process store,
//! expiring them lazily on read.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

pub use api::AppState;
pub use cache::{CacheBackend, CacheOptions, DocumentCache, Timeout};
pub use config::Config;
pub use error::{CacheError, Result};
pub use store::{StoreConfig, StoreContext};
