//! Store Host
//!
//! The namespaces a store server keeps in memory, one private table each.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Settings;
use crate::store::{MemoryStore, StoreStats};

/// Namespaced memory tables served over HTTP.
///
/// The outer lock only guards the namespace map; each table carries its own
/// lock, so traffic on different namespaces does not contend.
#[derive(Debug)]
pub struct StoreHost {
    namespaces: RwLock<HashMap<String, Arc<MemoryStore>>>,
    max_entries: usize,
    default_ttl: Option<Duration>,
}

impl StoreHost {
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            max_entries,
            default_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let ttl = (settings.default_ttl > 0).then(|| Duration::from_secs(settings.default_ttl));
        Self::new(settings.max_entries, ttl)
    }

    /// The table for `namespace`, created on first use.
    pub async fn namespace(&self, namespace: &str) -> Arc<MemoryStore> {
        if let Some(store) = self.namespaces.read().await.get(namespace) {
            return Arc::clone(store);
        }
        let mut namespaces = self.namespaces.write().await;
        let store = namespaces.entry(namespace.to_string()).or_insert_with(|| {
            debug!(namespace, "creating hosted namespace");
            Arc::new(MemoryStore::new(namespace, self.max_entries, self.default_ttl))
        });
        Arc::clone(store)
    }

    /// The table for `namespace` if it has been written to.
    pub async fn existing(&self, namespace: &str) -> Option<Arc<MemoryStore>> {
        self.namespaces.read().await.get(namespace).cloned()
    }

    /// Drops a namespace, returning how many entries it held.
    pub async fn remove(&self, namespace: &str) -> usize {
        match self.namespaces.write().await.remove(namespace) {
            Some(store) => store.clear(),
            None => 0,
        }
    }

    /// Namespace count and counters summed over every namespace.
    pub async fn stats(&self) -> (usize, StoreStats) {
        let namespaces = self.namespaces.read().await;
        let mut total = StoreStats::new();
        for store in namespaces.values() {
            total.absorb(&store.stats());
        }
        (namespaces.len(), total)
    }

    /// Removes expired entries in every namespace.
    pub async fn cleanup_expired(&self) -> usize {
        let stores: Vec<_> = self.namespaces.read().await.values().cloned().collect();
        stores.iter().map(|store| store.cleanup_expired()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EncodedValue;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let host = StoreHost::new(100, None);
        host.namespace("a").await.set_encoded("k", EncodedValue::Int(1));

        assert!(host.namespace("b").await.get_encoded("k").is_none());
        assert_eq!(host.existing("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_reports_entries() {
        let host = StoreHost::new(100, None);
        let store = host.namespace("a").await;
        store.set_encoded("k1", EncodedValue::Null);
        store.set_encoded("k2", EncodedValue::Null);

        assert_eq!(host.remove("a").await, 2);
        assert_eq!(host.remove("a").await, 0);
        assert!(host.existing("a").await.is_none());
    }

    #[tokio::test]
    async fn test_stats_sum_namespaces() {
        let host = StoreHost::new(100, None);
        host.namespace("a").await.set_encoded("k", EncodedValue::Null);
        host.namespace("b").await.set_encoded("k", EncodedValue::Null);
        host.namespace("a").await.get_encoded("k");
        host.namespace("b").await.get_encoded("missing");

        let (namespaces, stats) = host.stats().await;
        assert_eq!(namespaces, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired_spans_namespaces() {
        let host = StoreHost::new(100, Some(Duration::from_millis(20)));
        host.namespace("a").await.set_encoded("k", EncodedValue::Null);
        host.namespace("b").await.set_encoded("k", EncodedValue::Null);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(host.cleanup_expired().await, 2);
    }
}
