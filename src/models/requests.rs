//! Request DTOs for the store server API
//!
//! Defines the structure of incoming HTTP request bodies and queries.

use serde::{Deserialize, Serialize};

use crate::value::EncodedValue;

/// Request body for `PUT /stores/:namespace/keys/:key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutValueRequest {
    /// The value in its reference-preserving wire form
    pub value: EncodedValue,
}

/// Query string for `GET /stores/:namespace/keys`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysQuery {
    /// Only keys starting with this prefix; all keys when absent
    #[serde(default)]
    pub prefix: Option<String>,
}
