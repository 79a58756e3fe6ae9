//! Session Module
//!
//! Where session-mode caches learn which session they are serving, how
//! session ids map onto store keys, and the lifecycle hooks that remove
//! session data once sessions end.

mod cleanup;

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

pub use cleanup::{SweepRemoval, SweepReport, SWEEP_HEADER};

/// Leading marker of every per-session key.
pub const SESSION_KEY_PREFIX: &str = "sess_";

// == Session Context ==
/// Supplies the session a call is made on behalf of. Queried on every cache
/// operation, never captured.
pub trait SessionContext: Send + Sync {
    fn current_session_id(&self) -> String;
}

/// Session context that can also tell live sessions from ended ones.
pub trait SessionOracle: SessionContext {
    fn session_exists(&self, session_id: &str) -> bool;
}

impl<T: SessionContext + ?Sized> SessionContext for Arc<T> {
    fn current_session_id(&self) -> String {
        (**self).current_session_id()
    }
}

/// A context pinned to one session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSession(pub String);

impl FixedSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self(session_id.into())
    }
}

impl SessionContext for FixedSession {
    fn current_session_id(&self) -> String {
        self.0.clone()
    }
}

// == Session Registry ==
#[derive(Debug, Default)]
struct RegistryState {
    current: String,
    live: BTreeSet<String>,
}

/// In-process session bookkeeping: which sessions are live and which one the
/// current thread of work belongs to.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a session live and makes it current.
    pub fn start_session(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.live.insert(session_id.clone());
        state.current = session_id;
    }

    /// Makes an existing or ended session current without changing liveness.
    pub fn switch_to(&self, session_id: impl Into<String>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .current = session_id.into();
    }

    /// Ends a session. Its cached data stays until swept or removed.
    pub fn destroy_session(&self, session_id: &str) -> bool {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .remove(session_id)
    }

    pub fn live_sessions(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.live.iter().cloned().collect()
    }
}

impl SessionContext for SessionRegistry {
    fn current_session_id(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }
}

impl SessionOracle for SessionRegistry {
    fn session_exists(&self, session_id: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .contains(session_id)
    }
}

// == Key Partitioning ==
/// Key prefix of a session's partition: `sess_<hex id>/`. Hex keeps any
/// session id free of the `/` separator.
pub fn session_prefix(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{}/", hex::encode(session_id))
}

/// Recovers the session id from a per-session physical key.
pub fn session_id_from_key(key: &str) -> Option<String> {
    let (encoded, _) = key.strip_prefix(SESSION_KEY_PREFIX)?.split_once('/')?;
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        for id in ["", "abc123", "with/slash", "ünï"] {
            let key = format!("{}userselection", session_prefix(id));
            assert_eq!(session_id_from_key(&key).as_deref(), Some(id));
        }
    }

    #[test]
    fn test_foreign_keys_have_no_session() {
        assert_eq!(session_id_from_key("plain"), None);
        assert_eq!(session_id_from_key("sess_zz/key"), None);
        assert_eq!(session_id_from_key("sess_6162"), None);
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = SessionRegistry::new();
        registry.start_session("one");
        registry.start_session("two");

        assert_eq!(registry.current_session_id(), "two");
        assert!(registry.session_exists("one"));

        registry.switch_to("one");
        assert_eq!(registry.current_session_id(), "one");

        assert!(registry.destroy_session("one"));
        assert!(!registry.destroy_session("one"));
        assert!(!registry.session_exists("one"));
        assert_eq!(registry.live_sessions(), vec!["two".to_string()]);
    }

    #[test]
    fn test_shared_registry_is_a_context() {
        let registry = Arc::new(SessionRegistry::new());
        registry.start_session("abc");
        let context: Arc<dyn SessionContext> = Arc::new(registry.clone());
        assert_eq!(context.current_session_id(), "abc");
        assert_eq!(FixedSession::new("x").current_session_id(), "x");
    }
}
