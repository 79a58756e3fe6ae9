//! Remote Store Module
//!
//! Blocking HTTP client for a cacheplex store server. Each store instance
//! owns one namespace on the server; consistency between concurrent clients
//! is whatever the server's per-namespace lock provides.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use tracing::warn;

use super::{current_timestamp_ms, SearchableStore, Store, StoreKind};
use crate::error::{CacheError, Result};
use crate::models::{DeletedResponse, KeysResponse, PutValueRequest, ValueResponse};
use crate::value::CacheValue;

/// Environment variable naming a store server for isolated remote instances.
pub const TEST_REMOTE_URL_ENV: &str = "CACHEPLEX_TEST_REMOTE_URL";

const TEST_TIMEOUT: Duration = Duration::from_secs(2);

static ISOLATED_COUNTER: AtomicU64 = AtomicU64::new(0);

// == Remote Store ==
#[derive(Debug)]
pub struct RemoteStore {
    name: String,
    base: Url,
    namespace: String,
    client: Client,
}

impl RemoteStore {
    /// Connects to `url`, storing entries under `namespace`.
    pub fn connect(name: &str, url: &str, namespace: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url)
            .map_err(|err| CacheError::Config(format!("invalid store url '{url}': {err}")))?;
        if base.cannot_be_a_base() {
            return Err(CacheError::Config(format!("store url '{url}' cannot be a base")));
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: name.to_string(),
            base,
            namespace: namespace.to_string(),
            client,
        })
    }

    /// Connects under a namespace no other instance uses.
    pub fn connect_isolated(name: &str, url: &str, namespace: &str) -> Result<Self> {
        let unique = format!(
            "{namespace}#{}-{}-{}",
            std::process::id(),
            current_timestamp_ms(),
            ISOLATED_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        Self::connect(name, url, &unique, TEST_TIMEOUT)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds `<base>/stores/<namespace>/<segments..>`. Dot segments are
    /// refused because URL normalisation would drop them from the path.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let namespace = self.namespace.as_str();
        if let Some(dot) = std::iter::once(&namespace)
            .chain(segments)
            .find(|segment| matches!(**segment, "." | ".."))
        {
            return Err(CacheError::InvalidRequest(format!(
                "'{dot}' cannot be sent as a path segment"
            )));
        }

        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["stores", namespace])
                .extend(segments);
        }
        Ok(url)
    }

    fn try_get(&self, key: &str) -> Result<Option<CacheValue>> {
        let response = self.client.get(self.url(&["keys", key])?).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ValueResponse = checked(response)?.json()?;
        Ok(Some(body.value.decode()?))
    }

    fn try_set(&self, key: &str, value: &CacheValue) -> Result<()> {
        let body = PutValueRequest {
            value: value.encode_portable()?,
        };
        let response = self
            .client
            .put(self.url(&["keys", key])?)
            .json(&body)
            .send()?;
        checked(response)?;
        Ok(())
    }

    fn try_delete(&self, key: &str) -> Result<bool> {
        let response = self.client.delete(self.url(&["keys", key])?).send()?;
        let body: DeletedResponse = checked(response)?.json()?;
        Ok(body.deleted)
    }

    fn try_purge(&self) -> Result<()> {
        checked(self.client.delete(self.url(&[])?).send()?)?;
        Ok(())
    }

    fn try_find(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&["keys"])?)
            .query(&[("prefix", prefix)])
            .send()?;
        let body: KeysResponse = checked(response)?.json()?;
        Ok(body.keys)
    }

    fn degraded<T>(&self, operation: &str, err: CacheError, fallback: T) -> T {
        warn!(
            store = %self.name,
            namespace = %self.namespace,
            operation,
            error = %err,
            "remote store request failed"
        );
        fallback
    }
}

fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CacheError::Backend(format!("store server answered {status}")))
    }
}

impl Store for RemoteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    fn get(&self, key: &str) -> Option<CacheValue> {
        self.try_get(key)
            .unwrap_or_else(|err| self.degraded("get", err, None))
    }

    fn set(&self, key: &str, value: &CacheValue) -> bool {
        self.try_set(key, value)
            .map(|()| true)
            .unwrap_or_else(|err| self.degraded("set", err, false))
    }

    fn delete(&self, key: &str) -> bool {
        self.try_delete(key)
            .unwrap_or_else(|err| self.degraded("delete", err, false))
    }

    fn purge(&self) -> bool {
        self.try_purge()
            .map(|()| true)
            .unwrap_or_else(|err| self.degraded("purge", err, false))
    }

    fn searchable(&self) -> Option<&dyn SearchableStore> {
        Some(self)
    }
}

impl SearchableStore for RemoteStore {
    fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.try_find(prefix)
            .unwrap_or_else(|err| self.degraded("find", err, Vec::new()))
    }
}
