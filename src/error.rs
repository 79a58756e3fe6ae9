//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

// == Cache Error Enum ==
/// Unified error type for the cache layer and the store server.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No definition is configured for the requested component/area pair
    #[error("Unknown cache definition: {component}/{area}")]
    UnknownDefinition { component: String, area: String },

    /// No configured store can serve the definition's mode and requirements
    #[error("No compatible store for {definition}: {reason}")]
    NoCompatibleStore { definition: String, reason: String },

    /// The backing medium failed
    #[error("Backend failure: {0}")]
    Backend(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of a stored value failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key not found in a hosted namespace
    #[error("Key not found: {0}")]
    NotFound(String),
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::UnknownDefinition { .. } => StatusCode::NOT_FOUND,
            CacheError::NoCompatibleStore { .. } | CacheError::Config(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CacheError::Backend(_) | CacheError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            warn!(error = %self, "store server request failed");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_definition_message() {
        let err = CacheError::UnknownDefinition {
            component: "core".to_string(),
            area: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown cache definition: core/missing");
    }

    #[test]
    fn test_status_mapping() {
        let response = CacheError::NotFound("k".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = CacheError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = CacheError::Backend("down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let io = std::io::Error::other("disk gone");
        let response = CacheError::Io(io).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_toml_error_becomes_config_error() {
        let err: CacheError = toml::from_str::<toml::Value>("not = [valid")
            .unwrap_err()
            .into();
        assert!(matches!(err, CacheError::Config(_)));
    }
}
