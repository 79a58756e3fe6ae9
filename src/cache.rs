//! Cache Module
//!
//! The handle callers use. A [`Cache`] binds one definition to its ordered
//! store layers and translates logical keys into partitioned physical keys
//! at call time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::definition::{Definition, KeyPrefix};
use crate::error::{CacheError, Result};
use crate::session::{session_prefix, FixedSession, SessionContext};
use crate::store::{current_timestamp_ms, Store, StoreFeatures};
use crate::value::CacheValue;

/// First element of a TTL envelope list.
const TTL_MARKER: &str = "__cacheplex_ttl__";

// == Cache Scope ==
/// The session and request a cache operation runs in.
///
/// Clones share the request counter, so advancing the request through any
/// clone moves every cache built from the same scope.
#[derive(Clone)]
pub struct CacheScope {
    session: Arc<dyn SessionContext>,
    request: Arc<AtomicU64>,
}

impl CacheScope {
    pub fn new(session: Arc<dyn SessionContext>) -> Self {
        Self {
            session,
            request: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Same request counter, different session source.
    pub fn with_session(&self, session: Arc<dyn SessionContext>) -> Self {
        Self {
            session,
            request: Arc::clone(&self.request),
        }
    }

    pub fn session_id(&self) -> String {
        self.session.current_session_id()
    }

    pub fn request_id(&self) -> u64 {
        self.request.load(Ordering::SeqCst)
    }

    /// Starts a new request, returning its id.
    pub fn advance_request(&self) -> u64 {
        self.request.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for CacheScope {
    fn default() -> Self {
        Self::new(Arc::new(FixedSession::new("")))
    }
}

impl std::fmt::Debug for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheScope")
            .field("session", &self.session_id())
            .field("request", &self.request_id())
            .finish()
    }
}

// == Cache ==
/// A logical cache: one definition over one or more store layers, primary
/// first.
#[derive(Clone)]
pub struct Cache {
    definition: Arc<Definition>,
    stores: Vec<Arc<dyn Store>>,
    scope: CacheScope,
}

impl Cache {
    /// Binds `definition` to `stores`. At least one store is required.
    pub fn new(
        definition: impl Into<Arc<Definition>>,
        stores: Vec<Arc<dyn Store>>,
        scope: CacheScope,
    ) -> Result<Self> {
        let definition = definition.into();
        if stores.is_empty() {
            return Err(CacheError::NoCompatibleStore {
                definition: definition.id(),
                reason: "no store bound".to_string(),
            });
        }
        Ok(Self {
            definition,
            stores,
            scope,
        })
    }

    /// The same cache answering for another session.
    pub fn in_session(&self, session: Arc<dyn SessionContext>) -> Self {
        Self {
            scope: self.scope.with_session(session),
            ..self.clone()
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn stores(&self) -> &[Arc<dyn Store>] {
        &self.stores
    }

    pub fn primary(&self) -> &dyn Store {
        self.stores[0].as_ref()
    }

    pub fn scope(&self) -> &CacheScope {
        &self.scope
    }

    // == Reads ==
    /// Reads layers in order. A hit below the primary is copied into every
    /// layer above it.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        let physical = self.physical_key(key);
        for (depth, store) in self.stores.iter().enumerate() {
            if let Some(value) = self.read(store.as_ref(), &physical) {
                for upper in &self.stores[..depth] {
                    self.write(upper.as_ref(), &physical, &value);
                }
                return Some(value);
            }
        }
        debug!(definition = %self.definition.id(), key, "cache miss");
        None
    }

    pub fn get_many(&self, keys: &[&str]) -> BTreeMap<String, Option<CacheValue>> {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key)))
            .collect()
    }

    /// Typed read through serde. Absent keys are `Ok(None)`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| value.deserialize_into())
            .transpose()
    }

    pub fn has(&self, key: &str) -> bool {
        let physical = self.physical_key(key);
        self.stores
            .iter()
            .any(|store| match self.envelope_ttl(store.as_ref()) {
                Some(_) => self.read(store.as_ref(), &physical).is_some(),
                None => store.has(&physical),
            })
    }

    pub fn has_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.has(key))
    }

    pub fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has(key))
    }

    // == Writes ==
    /// Writes to every layer and reports the primary's result.
    pub fn set(&self, key: &str, value: impl Into<CacheValue>) -> bool {
        let physical = self.physical_key(key);
        let value = value.into();
        self.fan_out(|store| self.write(store, &physical, &value))
    }

    /// Returns how many entries the primary accepted.
    pub fn set_many(&self, entries: &[(&str, CacheValue)]) -> usize {
        entries
            .iter()
            .filter(|(key, value)| self.set(key, value.clone()))
            .count()
    }

    /// Typed write through serde.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<bool> {
        Ok(self.set(key, CacheValue::from_serialize(value)?))
    }

    /// Deletes from every layer; true when the primary held the key.
    pub fn delete(&self, key: &str) -> bool {
        let physical = self.physical_key(key);
        self.fan_out(|store| store.delete(&physical))
    }

    pub fn delete_many(&self, keys: &[&str]) -> usize {
        keys.iter().filter(|key| self.delete(key)).count()
    }

    /// Empties this cache's view. Partitioned caches lose only the current
    /// session's or request's keys.
    pub fn purge(&self) -> bool {
        let prefix = self.partition_prefix();
        if prefix.is_empty() {
            return self.fan_out(|store| store.purge());
        }
        let mut purged = true;
        for (depth, store) in self.stores.iter().enumerate() {
            let ok = purge_partition(store.as_ref(), &prefix).is_some();
            if depth == 0 {
                purged = ok;
            }
        }
        purged
    }

    /// Removes the current session's keys from every layer, returning how
    /// many the primary held. Caches not partitioned per session hold no
    /// per-user keys and remove nothing.
    pub fn purge_current_user(&self) -> usize {
        if self.definition.key_prefix() != KeyPrefix::PerSession {
            return 0;
        }
        let prefix = session_prefix(&self.scope.session_id());
        let mut removed = 0;
        for (depth, store) in self.stores.iter().enumerate() {
            let count = purge_partition(store.as_ref(), &prefix).unwrap_or(0);
            if depth == 0 {
                removed = count;
            }
        }
        removed
    }

    // == Search ==
    /// Logical keys starting with `prefix`, sorted. `None` when the primary
    /// store cannot enumerate keys.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<Vec<String>> {
        let primary = self.primary();
        let search = primary.searchable()?;
        let partition = self.partition_prefix();
        let keys = search
            .find_by_prefix(&format!("{partition}{prefix}"))
            .into_iter()
            .filter(|physical| {
                self.envelope_ttl(primary).is_none() || self.read(primary, physical).is_some()
            })
            .filter_map(|physical| physical.strip_prefix(&partition).map(str::to_string))
            .collect();
        Some(keys)
    }

    pub fn find_all(&self) -> Option<Vec<String>> {
        self.find_by_prefix("")
    }

    // == Key Translation ==
    fn partition_prefix(&self) -> String {
        match self.definition.key_prefix() {
            KeyPrefix::None => String::new(),
            KeyPrefix::PerSession => session_prefix(&self.scope.session_id()),
            KeyPrefix::PerRequest => format!("req_{}/", self.scope.request_id()),
        }
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{key}", self.partition_prefix())
    }

    // == Layer Helpers ==
    fn fan_out(&self, mut op: impl FnMut(&dyn Store) -> bool) -> bool {
        let mut primary = false;
        for (depth, store) in self.stores.iter().enumerate() {
            let ok = op(store.as_ref());
            if depth == 0 {
                primary = ok;
            }
        }
        primary
    }

    /// Lifetime to enforce here because `store` cannot expire entries itself.
    fn envelope_ttl(&self, store: &dyn Store) -> Option<Duration> {
        let ttl = self.definition.ttl()?;
        (!store.kind().supports_feature(StoreFeatures::NATIVE_TTL)).then_some(ttl)
    }

    fn write(&self, store: &dyn Store, physical: &str, value: &CacheValue) -> bool {
        match self.envelope_ttl(store) {
            Some(ttl) => {
                let expires_at = current_timestamp_ms().saturating_add(ttl.as_millis() as u64);
                let envelope = CacheValue::List(vec![
                    CacheValue::from(TTL_MARKER),
                    CacheValue::Int(expires_at as i64),
                    value.clone(),
                ]);
                store.set(physical, &envelope)
            }
            None => store.set(physical, value),
        }
    }

    fn read(&self, store: &dyn Store, physical: &str) -> Option<CacheValue> {
        let raw = store.get(physical)?;
        if self.envelope_ttl(store).is_none() {
            return Some(raw);
        }
        match raw {
            CacheValue::List(mut parts)
                if parts.len() == 3 && parts[0].as_str() == Some(TTL_MARKER) =>
            {
                let expires_at = parts[1].as_i64().unwrap_or_default();
                if current_timestamp_ms() as i64 >= expires_at {
                    store.delete(physical);
                    return None;
                }
                parts.pop()
            }
            other => Some(other),
        }
    }
}

/// Deletes every key under `prefix`, returning the count, or `None` when the
/// store cannot enumerate keys.
fn purge_partition(store: &dyn Store, prefix: &str) -> Option<usize> {
    let Some(search) = store.searchable() else {
        warn!(
            store = store.name(),
            prefix, "store cannot enumerate keys; partition left in place"
        );
        return None;
    };
    let keys = search.find_by_prefix(prefix);
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    Some(store.delete_many(&refs))
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stores: Vec<&str> = self.stores.iter().map(|s| s.name()).collect();
        f.debug_struct("Cache")
            .field("definition", &self.definition.id())
            .field("stores", &stores)
            .field("scope", &self.scope)
            .finish()
    }
}
