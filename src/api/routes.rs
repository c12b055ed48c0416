//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_handler, clear_handler, delete_handler, get_handler, has_handler, health_handler,
    set_handler, touch_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /set` - Store a value
/// - `POST /add` - Store a value unless a live one exists
/// - `GET /get/:key` - Retrieve a value
/// - `POST /touch/:key` - Reset a key's expiry
/// - `DELETE /del/:key` - Delete a key
/// - `GET /has/:key` - Check for a live entry
/// - `POST /clear` - Clear the cache namespace
/// - `GET /health` - Health check endpoint
///
/// Keyed endpoints accept `?version=N`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/set", put(set_handler))
        .route("/add", post(add_handler))
        .route("/get/:key", get(get_handler))
        .route("/touch/:key", post(touch_handler))
        .route("/del/:key", delete(delete_handler))
        .route("/has/:key", get(has_handler))
        .route("/clear", post(clear_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
