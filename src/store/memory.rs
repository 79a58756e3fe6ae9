//! Memory Store Module
//!
//! In-process backend: a HashMap table with LRU tracking and TTL expiration.
//! Values are held in encoded form, so every read decodes a fresh copy.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::warn;

use super::{CacheEntry, LruTracker, SearchableStore, Store, StoreKind, StoreStats};
use crate::value::{CacheValue, EncodedValue};

// == Memory Table ==
/// Main storage engine behind a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTable {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: StoreStats,
    /// Maximum number of entries allowed (0 = unbounded)
    max_entries: usize,
    /// Lifetime applied to every entry
    ttl: Option<Duration>,
}

impl MemoryTable {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: StoreStats::new(),
            max_entries,
            ttl,
        }
    }

    // == Set ==
    /// Stores an encoded value, evicting the least recently used entry when
    /// a new key would exceed capacity. Overwrites reset the TTL.
    pub fn set(&mut self, key: &str, value: EncodedValue) {
        let is_overwrite = self.entries.contains_key(key);
        if !is_overwrite && self.max_entries > 0 && self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.stats.record_eviction();
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, self.ttl));
        self.lru.touch(key);
    }

    // == Get ==
    /// Returns the live entry's value. Expired entries are dropped and
    /// counted as misses.
    pub fn get(&mut self, key: &str) -> Option<EncodedValue> {
        if self.take_if_expired(key) {
            self.stats.record_miss();
            return None;
        }
        match self.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Presence check that leaves stats and recency untouched.
    pub fn contains(&mut self, key: &str) -> bool {
        !self.take_if_expired(key) && self.entries.contains_key(key)
    }

    // == Delete ==
    /// Returns whether a live entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        match self.entries.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    /// Sorted live keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        expired.len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_entries: self.entries.len(),
            ..self.stats.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take_if_expired(&mut self, key: &str) -> bool {
        let expired = self.entries.get(key).is_some_and(CacheEntry::is_expired);
        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        expired
    }
}

// == Memory Store ==
/// Store backed by a private [`MemoryTable`]; nothing is shared between
/// instances.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    table: Mutex<MemoryTable>,
}

impl MemoryStore {
    pub fn new(name: &str, max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            table: Mutex::new(MemoryTable::new(max_entries, ttl)),
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.table().stats()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.table().cleanup_expired()
    }

    /// Reads the stored wire form without decoding it.
    pub fn get_encoded(&self, key: &str) -> Option<EncodedValue> {
        self.table().get(key)
    }

    /// Stores a value already in wire form.
    pub fn set_encoded(&self, key: &str, value: EncodedValue) {
        self.table().set(key, value);
    }

    /// Empties the table, returning how many entries it held.
    pub fn clear(&self) -> usize {
        let mut table = self.table();
        let held = table.len();
        table.clear();
        held
    }

    fn table(&self) -> MutexGuard<'_, MemoryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn get(&self, key: &str) -> Option<CacheValue> {
        let encoded = self.table().get(key)?;
        match encoded.decode() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "dropping undecodable entry");
                self.table().delete(key);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &CacheValue) -> bool {
        match value.encode_portable() {
            Ok(encoded) => {
                self.table().set(key, encoded);
                true
            }
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "refusing to store value");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.table().delete(key)
    }

    fn has(&self, key: &str) -> bool {
        self.table().contains(key)
    }

    fn purge(&self) -> bool {
        self.table().clear();
        true
    }

    fn searchable(&self) -> Option<&dyn SearchableStore> {
        Some(self)
    }
}

impl SearchableStore for MemoryStore {
    fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.table().keys_with_prefix(prefix)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;
    use std::thread::sleep;

    fn text(s: &str) -> EncodedValue {
        EncodedValue::Str(s.to_string())
    }

    #[test]
    fn test_table_set_and_get() {
        let mut table = MemoryTable::new(100, None);
        table.set("key1", text("value1"));

        assert_eq!(table.get("key1"), Some(text("value1")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_overwrite() {
        let mut table = MemoryTable::new(100, None);
        table.set("key1", text("value1"));
        table.set("key1", text("value2"));

        assert_eq!(table.get("key1"), Some(text("value2")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_delete_reports_presence() {
        let mut table = MemoryTable::new(100, None);
        table.set("key1", text("value1"));

        assert!(table.delete("key1"));
        assert!(!table.delete("key1"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_ttl_expiration() {
        let mut table = MemoryTable::new(100, Some(Duration::from_millis(50)));
        table.set("key1", text("value1"));
        assert!(table.contains("key1"));

        sleep(Duration::from_millis(80));

        assert!(!table.contains("key1"));
        assert_eq!(table.get("key1"), None);
    }

    #[test]
    fn test_table_lru_eviction() {
        let mut table = MemoryTable::new(3, None);
        table.set("key1", text("v"));
        table.set("key2", text("v"));
        table.set("key3", text("v"));

        // key1 becomes most recently used, so key2 is evicted next
        table.get("key1");
        table.set("key4", text("v"));

        assert_eq!(table.len(), 3);
        assert!(table.contains("key1"));
        assert!(!table.contains("key2"));
        assert_eq!(table.stats().evictions, 1);
    }

    #[test]
    fn test_table_unbounded_when_zero_capacity() {
        let mut table = MemoryTable::new(0, None);
        for i in 0..500 {
            table.set(&format!("key{i}"), EncodedValue::Int(i));
        }
        assert_eq!(table.len(), 500);
    }

    #[test]
    fn test_table_stats() {
        let mut table = MemoryTable::new(100, None);
        table.set("key1", text("value1"));
        table.get("key1");
        table.get("nonexistent");

        let stats = table.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_table_cleanup_expired() {
        let mut table = MemoryTable::new(100, Some(Duration::from_millis(50)));
        table.set("key1", text("v"));
        sleep(Duration::from_millis(80));

        assert_eq!(table.cleanup_expired(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_store_returns_distinct_objects() {
        let store = MemoryStore::new("memory", 0, None);
        let object = ObjectRef::with_fields([("test", "element")]);
        let value = CacheValue::Object(object.clone());
        assert!(store.set("obj", &value));

        let first = store.get("obj").unwrap();
        let second = store.get("obj").unwrap();
        assert_eq!(first, value);
        assert!(!first.as_object().unwrap().ptr_eq(&object));
        assert!(!first.as_object().unwrap().ptr_eq(second.as_object().unwrap()));
    }

    #[test]
    fn test_store_refuses_non_finite_floats() {
        let store = MemoryStore::new("memory", 0, None);
        assert!(!store.set("score", &CacheValue::Float(f64::NAN)));
        assert!(!store.has("score"));
    }

    #[test]
    fn test_store_search_is_sorted() {
        let store = MemoryStore::new("memory", 0, None);
        store.set("test2", &CacheValue::from("blah2"));
        store.set("fred", &CacheValue::from("blah2"));
        store.set("test1", &CacheValue::from("blah"));

        let search = store.searchable().unwrap();
        assert_eq!(search.find_by_prefix("test"), vec!["test1", "test2"]);
        assert_eq!(search.find_all(), vec!["fred", "test1", "test2"]);
    }
}
