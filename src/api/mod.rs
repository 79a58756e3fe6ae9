//! API Module
//!
//! HTTP handlers and routing for the store server REST API, which hosts the
//! namespaces remote stores read and write.
//!
//! # Endpoints
//! - `GET /stores/:namespace/keys/:key` - Read a value
//! - `PUT /stores/:namespace/keys/:key` - Store a value
//! - `DELETE /stores/:namespace/keys/:key` - Delete a key
//! - `GET /stores/:namespace/keys?prefix=` - List keys, sorted
//! - `DELETE /stores/:namespace` - Drop a namespace
//! - `GET /stats` - Counters across all namespaces
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod host;
pub mod routes;

pub use handlers::*;
pub use host::StoreHost;
pub use routes::create_router;
