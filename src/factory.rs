//! Cache Factory Module
//!
//! Resolves definitions from the configuration source, picks and caches the
//! store instances that serve them, and hands out [`Cache`] handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::cache::{Cache, CacheScope};
use crate::config::{ConfigSource, StoreConfig};
use crate::definition::{Definition, Mode};
use crate::error::{CacheError, Result};
use crate::session::SessionOracle;
use crate::store::Store;

type StoreSlot = (String, Mode);

// == Cache Factory ==
/// Explicit entry point for obtaining caches. Holds no global state; drop it
/// or call [`CacheFactory::reset`] to start over.
pub struct CacheFactory {
    config: Arc<dyn ConfigSource>,
    sessions: Arc<dyn SessionOracle>,
    scope: CacheScope,
    definitions: Mutex<HashMap<String, Arc<Definition>>>,
    stores: Mutex<HashMap<StoreSlot, Vec<Arc<dyn Store>>>>,
}

impl CacheFactory {
    pub fn new(config: Arc<dyn ConfigSource>, sessions: Arc<dyn SessionOracle>) -> Self {
        let scope = CacheScope::new(Arc::new(Arc::clone(&sessions)));
        Self {
            config,
            sessions,
            scope,
            definitions: Mutex::new(HashMap::new()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &dyn SessionOracle {
        self.sessions.as_ref()
    }

    pub fn scope(&self) -> &CacheScope {
        &self.scope
    }

    // == Resolve ==
    /// Looks up the definition for `component/area`, caching the result.
    pub fn resolve(&self, component: &str, area: &str) -> Result<Arc<Definition>> {
        let id = format!("{component}/{area}");
        if let Some(definition) = lock(&self.definitions).get(&id) {
            return Ok(Arc::clone(definition));
        }

        let config = self
            .config
            .definitions()
            .into_iter()
            .find(|d| d.component == component && d.area == area)
            .ok_or_else(|| CacheError::UnknownDefinition {
                component: component.to_string(),
                area: area.to_string(),
            })?;
        let definition = Arc::new(Definition::from_config(&config));
        debug!(definition = %id, mode = %definition.mode(), "resolved cache definition");

        Ok(Arc::clone(
            lock(&self.definitions).entry(id).or_insert(definition),
        ))
    }

    /// Every configured session-mode definition.
    pub fn session_definitions(&self) -> Result<Vec<Arc<Definition>>> {
        self.config
            .definitions()
            .into_iter()
            .filter(|d| d.mode == Mode::Session)
            .map(|d| self.resolve(&d.component, &d.area))
            .collect()
    }

    // == Store Selection ==
    /// The primary store serving `definition`.
    pub fn get_store_for(&self, definition: &Definition) -> Result<Arc<dyn Store>> {
        let stores = self.get_stores_for(definition)?;
        Ok(Arc::clone(&stores[0]))
    }

    /// Every store layer serving `definition`, primary first. Instances are
    /// created once per definition and mode, then reused.
    pub fn get_stores_for(&self, definition: &Definition) -> Result<Vec<Arc<dyn Store>>> {
        let slot = (definition.id(), definition.mode());
        if let Some(stores) = lock(&self.stores).get(&slot) {
            return Ok(stores.clone());
        }

        let stores = self
            .candidates(definition)?
            .iter()
            .map(|config| config.kind.initialise(definition, config))
            .collect::<Result<Vec<_>>>()?;
        info!(
            definition = %slot.0,
            stores = ?stores.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "bound cache stores"
        );

        Ok(lock(&self.stores).entry(slot).or_insert(stores).clone())
    }

    fn candidates(&self, definition: &Definition) -> Result<Vec<StoreConfig>> {
        let configured = self.config.stores();
        let no_store = |reason: String| CacheError::NoCompatibleStore {
            definition: definition.id(),
            reason,
        };
        let by_name = |name: &String| {
            configured
                .iter()
                .find(|c| &c.name == name)
                .cloned()
                .ok_or_else(|| no_store(format!("store '{name}' is not configured")))
        };

        // Explicit mappings must all be usable.
        if !definition.store_names().is_empty() {
            let explicit = definition
                .store_names()
                .iter()
                .map(by_name)
                .collect::<Result<Vec<_>>>()?;
            for config in &explicit {
                config
                    .kind
                    .check_compatible(definition)
                    .map_err(|reason| no_store(format!("store '{}': {reason}", config.name)))?;
            }
            return Ok(explicit);
        }

        let compatible = |config: &StoreConfig| config.kind.check_compatible(definition).is_ok();

        let mapped = self
            .config
            .mode_mapping(definition.mode())
            .iter()
            .map(by_name)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(compatible)
            .collect::<Vec<_>>();
        if !mapped.is_empty() {
            return Ok(mapped);
        }

        configured
            .iter()
            .find(|c| compatible(*c))
            .cloned()
            .map(|config| vec![config])
            .ok_or_else(|| {
                no_store(format!(
                    "none of {} configured stores supports {} mode",
                    configured.len(),
                    definition.mode()
                ))
            })
    }

    // == Make ==
    pub fn make(&self, component: &str, area: &str) -> Result<Cache> {
        let definition = self.resolve(component, area)?;
        self.make_from_definition(definition)
    }

    /// Binds an already resolved or ad-hoc definition to its stores.
    pub fn make_from_definition(&self, definition: Arc<Definition>) -> Result<Cache> {
        let stores = self.get_stores_for(&definition)?;
        Cache::new(definition, stores, self.scope.clone())
    }

    // == Lifecycle ==
    /// Purges and forgets every store instance and definition, then starts a
    /// new request.
    pub fn reset(&self) {
        let stores: Vec<_> = lock(&self.stores).drain().collect();
        for (_, layers) in &stores {
            for store in layers {
                store.purge();
            }
        }
        lock(&self.definitions).clear();
        let request = self.scope.advance_request();
        info!(stores = stores.len(), request, "cache factory reset");
    }

    /// Purges request-mode stores and moves on to the next request.
    pub fn end_request(&self) -> u64 {
        let request_stores: Vec<Arc<dyn Store>> = lock(&self.stores)
            .iter()
            .filter(|((_, mode), _)| *mode == Mode::Request)
            .flat_map(|(_, layers)| layers.iter().cloned())
            .collect();
        for store in &request_stores {
            store.purge();
        }
        let request = self.scope.advance_request();
        debug!(request, purged = request_stores.len(), "request ended");
        request
    }

    /// Purges every layer of a definition, across all sessions and requests.
    pub fn purge_definition(&self, component: &str, area: &str) -> Result<bool> {
        let definition = self.resolve(component, area)?;
        let stores = self.get_stores_for(&definition)?;
        let purged = stores.iter().fold(true, |ok, store| store.purge() && ok);
        info!(definition = %definition.id(), purged, "purged cache definition");
        Ok(purged)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, DefinitionConfig, ModeMappings};
    use crate::session::SessionRegistry;
    use crate::value::CacheValue;
    use tempfile::TempDir;

    fn definition(area: &str, mode: Mode) -> DefinitionConfig {
        DefinitionConfig {
            component: "core".to_string(),
            area: area.to_string(),
            mode,
            ttl: 0,
            requires_searchable: false,
            key_prefix: None,
            stores: Vec::new(),
        }
    }

    fn factory(config: CacheConfig) -> (CacheFactory, Arc<SessionRegistry>) {
        let sessions = Arc::new(SessionRegistry::new());
        sessions.start_session("s1");
        (CacheFactory::new(Arc::new(config), sessions.clone()), sessions)
    }

    fn memory_only() -> CacheConfig {
        CacheConfig {
            stores: vec![StoreConfig::memory("mem")],
            mode_mappings: ModeMappings::default(),
            definitions: vec![
                definition("config", Mode::Application),
                definition("request", Mode::Request),
                definition("userselections", Mode::Session),
            ],
        }
    }

    #[test]
    fn test_unknown_definition() {
        let (factory, _) = factory(memory_only());
        let err = factory.make("core", "nothing").unwrap_err();
        assert!(matches!(err, CacheError::UnknownDefinition { .. }));
    }

    #[test]
    fn test_no_store_for_session_mode() {
        let (factory, _) = factory(memory_only());
        let err = factory.make("core", "userselections").unwrap_err();
        assert!(matches!(err, CacheError::NoCompatibleStore { .. }));
    }

    #[test]
    fn test_incompatible_explicit_mapping_fails() {
        let mut config = memory_only();
        config.definitions[2].stores = vec!["mem".to_string()];
        let (factory, _) = factory(config);
        let err = factory.make("core", "userselections").unwrap_err();
        assert!(err.to_string().contains("mem"));
    }

    #[test]
    fn test_store_instances_are_reused() {
        let (factory, _) = factory(memory_only());
        let first = factory.make("core", "config").unwrap();
        let second = factory.make("core", "config").unwrap();

        first.set("k", 1);
        assert_eq!(second.get("k"), Some(CacheValue::from(1)));
        assert!(Arc::ptr_eq(&first.stores()[0], &second.stores()[0]));
    }

    #[test]
    fn test_definitions_get_separate_instances() {
        let (factory, _) = factory(memory_only());
        let config = factory.make("core", "config").unwrap();
        let request = factory.make("core", "request").unwrap();

        config.set("k", 1);
        assert!(!request.has("k"));
    }

    #[test]
    fn test_mode_mapping_skips_incompatible_stores() {
        let root = TempDir::new().unwrap();
        let config = CacheConfig {
            stores: vec![
                StoreConfig::memory("mem"),
                StoreConfig::file("disk", root.path()),
            ],
            mode_mappings: ModeMappings {
                session: vec!["mem".to_string(), "disk".to_string()],
                ..ModeMappings::default()
            },
            definitions: vec![definition("userselections", Mode::Session)],
        };
        let (factory, _) = factory(config);
        let cache = factory.make("core", "userselections").unwrap();
        assert_eq!(cache.primary().name(), "disk");
        assert_eq!(cache.stores().len(), 1);
    }

    #[test]
    fn test_reset_isolates_instances() {
        let (factory, _) = factory(memory_only());
        let before = factory.make("core", "config").unwrap();
        before.set("k", "v");

        factory.reset();

        let after = factory.make("core", "config").unwrap();
        assert_eq!(after.get("k"), None);
        assert!(!Arc::ptr_eq(&before.stores()[0], &after.stores()[0]));
    }

    #[test]
    fn test_end_request_clears_request_caches() {
        let (factory, _) = factory(memory_only());
        let request = factory.make("core", "request").unwrap();
        let app = factory.make("core", "config").unwrap();
        request.set("k", 1);
        app.set("k", 1);

        factory.end_request();

        assert!(!request.has("k"));
        assert!(app.has("k"));
    }

    #[test]
    fn test_purge_definition_spans_sessions() {
        let root = TempDir::new().unwrap();
        let config = CacheConfig {
            stores: vec![StoreConfig::file("disk", root.path())],
            mode_mappings: ModeMappings::default(),
            definitions: vec![definition("userselections", Mode::Session)],
        };
        let (factory, sessions) = factory(config);
        let cache = factory.make("core", "userselections").unwrap();
        cache.set("k", 1);
        sessions.start_session("s2");
        cache.set("k", 2);

        assert!(factory.purge_definition("core", "userselections").unwrap());
        sessions.switch_to("s1");
        assert!(!cache.has("k"));
    }
}
