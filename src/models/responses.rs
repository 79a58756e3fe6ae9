//! Response DTOs for the store server API
//!
//! Defines the structure of outgoing HTTP response bodies. Each derives
//! `Deserialize` as well, for the remote store client.

use serde::{Deserialize, Serialize};

use crate::store::StoreStats;
use crate::value::EncodedValue;

/// Response body for `GET /stores/:namespace/keys/:key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueResponse {
    pub key: String,
    pub value: EncodedValue,
}

/// Response body for `PUT /stores/:namespace/keys/:key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub key: String,
    pub stored: bool,
}

impl StoredResponse {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stored: true,
        }
    }
}

/// Response body for `DELETE /stores/:namespace/keys/:key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub key: String,
    /// Whether the key was present
    pub deleted: bool,
}

/// Response body for `GET /stores/:namespace/keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysResponse {
    pub namespace: String,
    /// Matching keys, sorted
    pub keys: Vec<String>,
}

/// Response body for `DELETE /stores/:namespace`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgedResponse {
    pub namespace: String,
    /// Entries the namespace held before the purge
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Number of hosted namespaces
    pub namespaces: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries across all namespaces
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(namespaces: usize, stats: &StoreStats) -> Self {
        Self {
            namespaces,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
