//! Request and Response models for the store server API
//!
//! DTOs shared by the axum handlers and the remote store client, so both
//! sides of the wire agree on one shape.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{KeysQuery, PutValueRequest};
pub use responses::{
    DeletedResponse, ErrorResponse, HealthResponse, KeysResponse, PurgedResponse, StatsResponse,
    StoredResponse, ValueResponse,
};
