//! API Handlers
//!
//! HTTP request handlers for each store server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::debug;

use super::host::StoreHost;
use crate::config::Settings;
use crate::error::{CacheError, Result};
use crate::models::{
    DeletedResponse, HealthResponse, KeysQuery, KeysResponse, PurgedResponse, PutValueRequest,
    StatsResponse, StoredResponse, ValueResponse,
};
use crate::store::{SearchableStore, Store, MAX_KEY_LENGTH};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<StoreHost>,
}

impl AppState {
    pub fn new(host: StoreHost) -> Self {
        Self {
            host: Arc::new(host),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(StoreHost::from_settings(settings))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {MAX_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Handler for GET /stores/:namespace/keys/:key
pub async fn get_value_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<ValueResponse>> {
    validate_key(&key)?;
    let value = state
        .host
        .existing(&namespace)
        .await
        .and_then(|store| store.get_encoded(&key))
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(ValueResponse { key, value }))
}

/// Handler for PUT /stores/:namespace/keys/:key
pub async fn put_value_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Json(req): Json<PutValueRequest>,
) -> Result<Json<StoredResponse>> {
    validate_key(&key)?;
    state.host.namespace(&namespace).await.set_encoded(&key, req.value);

    Ok(Json(StoredResponse::new(key)))
}

/// Handler for DELETE /stores/:namespace/keys/:key
pub async fn delete_value_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<DeletedResponse>> {
    validate_key(&key)?;
    let deleted = match state.host.existing(&namespace).await {
        Some(store) => store.delete(&key),
        None => false,
    };

    Ok(Json(DeletedResponse { key, deleted }))
}

/// Handler for GET /stores/:namespace/keys
pub async fn list_keys_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(query): Query<KeysQuery>,
) -> Json<KeysResponse> {
    let prefix = query.prefix.unwrap_or_default();
    let keys = match state.host.existing(&namespace).await {
        Some(store) => store.find_by_prefix(&prefix),
        None => Vec::new(),
    };

    Json(KeysResponse { namespace, keys })
}

/// Handler for DELETE /stores/:namespace
pub async fn purge_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<PurgedResponse> {
    let removed = state.host.remove(&namespace).await;
    debug!(namespace = %namespace, removed, "purged hosted namespace");

    Json(PurgedResponse { namespace, removed })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let (namespaces, stats) = state.host.stats().await;
    Json(StatsResponse::new(namespaces, &stats))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EncodedValue;

    fn state() -> AppState {
        AppState::new(StoreHost::new(100, None))
    }

    fn path(namespace: &str, key: &str) -> Path<(String, String)> {
        Path((namespace.to_string(), key.to_string()))
    }

    #[tokio::test]
    async fn test_put_and_get_handler() {
        let state = state();
        let req = PutValueRequest {
            value: EncodedValue::Str("test_value".to_string()),
        };
        put_value_handler(State(state.clone()), path("ns", "test_key"), Json(req))
            .await
            .unwrap();

        let response = get_value_handler(State(state), path("ns", "test_key"))
            .await
            .unwrap();
        assert_eq!(response.value, EncodedValue::Str("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_namespace() {
        let result = get_value_handler(State(state()), path("nowhere", "k")).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let state = state();
        let req = PutValueRequest {
            value: EncodedValue::Null,
        };
        put_value_handler(State(state.clone()), path("ns", "k"), Json(req))
            .await
            .unwrap();

        let first = delete_value_handler(State(state.clone()), path("ns", "k"))
            .await
            .unwrap();
        let second = delete_value_handler(State(state), path("ns", "k"))
            .await
            .unwrap();
        assert!(first.deleted);
        assert!(!second.deleted);
    }

    #[tokio::test]
    async fn test_overlong_key_rejected() {
        let key = "x".repeat(MAX_KEY_LENGTH + 1);
        let result = delete_value_handler(State(state()), path("ns", &key)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_list_keys_filters_by_prefix() {
        let state = state();
        let store = state.host.namespace("ns").await;
        store.set_encoded("b1", EncodedValue::Null);
        store.set_encoded("a1", EncodedValue::Null);
        store.set_encoded("b0", EncodedValue::Null);

        let query = KeysQuery {
            prefix: Some("b".to_string()),
        };
        let response =
            list_keys_handler(State(state), Path("ns".to_string()), Query(query)).await;
        assert_eq!(response.keys, vec!["b0", "b1"]);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
