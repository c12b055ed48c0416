//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `POST /add` - Store a JSON value
//! - `GET /get/:key`, `GET /has/:key` - Read a value or check for one
//! - `POST /touch/:key` - Reset a key's expiry
//! - `DELETE /del/:key` - Delete a key
//! - `POST /clear` - Clear the cache namespace
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
