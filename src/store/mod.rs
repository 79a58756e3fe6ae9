//! Store Module
//!
//! The contract every storage backend satisfies, and the closed set of
//! backend kinds with their static capabilities.

mod entry;
mod file;
mod lru;
mod memory;
mod remote;
mod stats;

#[cfg(test)]
mod property_tests;

use std::collections::BTreeMap;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreConfig;
use crate::definition::{Definition, Mode, ModeSet};
use crate::error::{CacheError, Result};
use crate::value::CacheValue;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use file::FileStore;
pub use lru::LruTracker;
pub use memory::MemoryStore;
pub use remote::{RemoteStore, TEST_REMOTE_URL_ENV};
pub use stats::StoreStats;

// == Public Constants ==
/// Maximum allowed key length in bytes, after partition prefixes
pub const MAX_KEY_LENGTH: usize = 512;

// == Store Contract ==
/// A storage backend bound to one definition.
///
/// Failures of the underlying medium never surface as errors here: `get`
/// reports them as absent, writes report them through their boolean or count.
pub trait Store: Send + Sync {
    /// Display name of the configured store
    fn name(&self) -> &str;

    fn kind(&self) -> StoreKind;

    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Returns an entry for every requested key.
    fn get_many(&self, keys: &[&str]) -> BTreeMap<String, Option<CacheValue>> {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key)))
            .collect()
    }

    /// Stores a value, overwriting silently. False only on a backend fault.
    fn set(&self, key: &str, value: &CacheValue) -> bool;

    /// Returns the number of entries written.
    fn set_many(&self, entries: &[(&str, CacheValue)]) -> usize {
        entries
            .iter()
            .filter(|(key, value)| self.set(key, value))
            .count()
    }

    /// Returns whether the key was present.
    fn delete(&self, key: &str) -> bool;

    /// Returns the number of keys that were present.
    fn delete_many(&self, keys: &[&str]) -> usize {
        keys.iter().filter(|key| self.delete(key)).count()
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn has_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.has(key))
    }

    fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has(key))
    }

    /// Removes every entry of this instance and nothing else.
    fn purge(&self) -> bool;

    /// Search capability, present only on searchable stores.
    fn searchable(&self) -> Option<&dyn SearchableStore> {
        None
    }
}

/// Key enumeration for stores that support it. Results are sorted.
pub trait SearchableStore {
    fn find_by_prefix(&self, prefix: &str) -> Vec<String>;

    fn find_all(&self) -> Vec<String> {
        self.find_by_prefix("")
    }
}

// == Capabilities ==
/// Bitset of optional store features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreFeatures(u8);

impl StoreFeatures {
    pub const NONE: StoreFeatures = StoreFeatures(0);
    /// Every `get` returns an independent copy of stored objects
    pub const DEREFERENCES_OBJECTS: StoreFeatures = StoreFeatures(0b001);
    /// Entries expire inside the store
    pub const NATIVE_TTL: StoreFeatures = StoreFeatures(0b010);
    /// Keys can be enumerated
    pub const SEARCHABLE: StoreFeatures = StoreFeatures(0b100);

    pub const fn contains(self, other: StoreFeatures) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StoreFeatures {
    type Output = StoreFeatures;

    fn bitor(self, rhs: StoreFeatures) -> StoreFeatures {
        StoreFeatures(self.0 | rhs.0)
    }
}

// == Store Kind ==
/// The backends a store configuration can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
    Remote,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::File => "file",
            StoreKind::Remote => "remote",
        }
    }

    pub const fn supported_modes(self) -> ModeSet {
        match self {
            StoreKind::Memory => ModeSet::of(&[Mode::Application, Mode::Request]),
            StoreKind::File => ModeSet::of(&[Mode::Application, Mode::Session, Mode::Request]),
            StoreKind::Remote => ModeSet::of(&[Mode::Application, Mode::Session]),
        }
    }

    pub const fn supports_mode(self, mode: Mode) -> bool {
        self.supported_modes().contains(mode)
    }

    pub fn supported_features(self) -> StoreFeatures {
        match self {
            StoreKind::Memory | StoreKind::File => {
                StoreFeatures::DEREFERENCES_OBJECTS
                    | StoreFeatures::NATIVE_TTL
                    | StoreFeatures::SEARCHABLE
            }
            StoreKind::Remote => StoreFeatures::DEREFERENCES_OBJECTS | StoreFeatures::SEARCHABLE,
        }
    }

    pub fn supports_feature(self, feature: StoreFeatures) -> bool {
        self.supported_features().contains(feature)
    }

    /// Explains why this kind cannot serve `definition`, if it cannot.
    pub fn check_compatible(self, definition: &Definition) -> std::result::Result<(), String> {
        if !self.supports_mode(definition.mode()) {
            return Err(format!(
                "{} stores do not support {} mode",
                self.as_str(),
                definition.mode()
            ));
        }
        if definition.requires_searchable() && !self.supports_feature(StoreFeatures::SEARCHABLE) {
            return Err(format!("{} stores are not searchable", self.as_str()));
        }
        Ok(())
    }

    /// Creates a store instance for `definition` from its configuration.
    pub fn initialise(self, definition: &Definition, config: &StoreConfig) -> Result<Arc<dyn Store>> {
        self.check_compatible(definition)
            .map_err(|reason| CacheError::NoCompatibleStore {
                definition: definition.id(),
                reason,
            })?;
        debug!(
            store = %config.name,
            kind = self.as_str(),
            definition = %definition.id(),
            "initialising store instance"
        );

        let store: Arc<dyn Store> = match self {
            StoreKind::Memory => Arc::new(MemoryStore::new(
                &config.name,
                config.max_entries,
                definition.ttl(),
            )),
            StoreKind::File => {
                let root = config.path.as_ref().ok_or_else(|| {
                    CacheError::Config(format!("file store '{}' has no path", config.name))
                })?;
                Arc::new(FileStore::open(&config.name, root, definition)?)
            }
            StoreKind::Remote => {
                let url = config.url.as_deref().ok_or_else(|| {
                    CacheError::Config(format!("remote store '{}' has no url", config.name))
                })?;
                Arc::new(RemoteStore::connect(
                    &config.name,
                    url,
                    &definition.id(),
                    Duration::from_millis(config.timeout_ms),
                )?)
            }
        };
        Ok(store)
    }

    /// Creates an isolated instance for `definition` that shares nothing
    /// with any other instance, or `None` when this kind cannot run here.
    ///
    /// Remote instances need a live store server named by
    /// [`TEST_REMOTE_URL_ENV`].
    pub fn initialise_test_instance(self, definition: &Definition) -> Option<Arc<dyn Store>> {
        if self.check_compatible(definition).is_err() {
            return None;
        }
        let name = format!("{} test", self.as_str());
        match self {
            StoreKind::Memory => Some(Arc::new(MemoryStore::new(&name, 0, definition.ttl()))),
            StoreKind::File => FileStore::temporary(&name, definition)
                .map(|store| Arc::new(store) as Arc<dyn Store>)
                .ok(),
            StoreKind::Remote => {
                let url = std::env::var(TEST_REMOTE_URL_ENV).ok()?;
                RemoteStore::connect_isolated(&name, &url, &definition.id())
                    .map(|store| Arc::new(store) as Arc<dyn Store>)
                    .ok()
            }
        }
    }
}
