//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Every handler is a
//! thin shell over one [`CacheBackend`] operation on the shared façade.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheBackend, DocumentCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    AddResponse, ClearResponse, DeleteResponse, GetResponse, HasResponse, HealthResponse,
    SetRequest, SetResponse, TouchRequest, TouchResponse, VersionQuery,
};
use crate::store::StoreContext;

/// Application state shared across all handlers.
///
/// The façade is cheap to clone; clones share one store context.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: DocumentCache,
}

impl AppState {
    pub fn new(cache: DocumentCache) -> Self {
        Self { cache }
    }

    /// Creates a new AppState from configuration.
    ///
    /// The backing store itself is built lazily on the first request.
    pub fn from_config(config: &Config) -> Result<Self> {
        let context = Arc::new(StoreContext::new(config.store_config()?));
        Ok(Self::new(DocumentCache::new(context, config.cache_options())))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value unconditionally.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state
        .cache
        .set(&req.key, &req.value, req.timeout(), req.version)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for POST /add
///
/// Stores a JSON value only if the key holds no live entry.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<AddResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let added = state
        .cache
        .add(&req.key, &req.value, req.timeout(), req.version)
        .await?;

    Ok(Json(AddResponse::new(req.key, added)))
}

/// Handler for GET /get/:key
///
/// Misses, expired entries and unreadable payloads all answer 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<GetResponse>> {
    let value: Option<Value> = state.cache.get(&key, query.version).await?;

    match value {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for POST /touch/:key
///
/// The body is optional; without one the default timeout applies.
pub async fn touch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
    body: Option<Json<TouchRequest>>,
) -> Result<Json<TouchResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    state.cache.touch(&key, req.timeout(), query.version).await?;

    Ok(Json(TouchResponse::new(key)))
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<DeleteResponse>> {
    state.cache.delete(&key, query.version).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /has/:key
pub async fn has_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<HasResponse>> {
    let exists = state.cache.has_key(&key, query.version).await?;

    Ok(Json(HasResponse::new(key, exists)))
}

/// Handler for POST /clear
///
/// Clears this cache's namespace only.
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    state.cache.clear().await?;

    Ok(Json(ClearResponse::new(state.cache.key_prefix())))
}

/// Handler for GET /health
///
/// Initializes the backing store if needed, so an unreachable
/// configuration surfaces here as 503.
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let store = state.cache.context().store().await?;

    Ok(Json(HealthResponse::healthy(store.name())))
}
