//! Session data cleanup: the periodic sweep of ended sessions and removal of
//! a single session's data on logout.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, info};

use super::{session_id_from_key, session_prefix, SESSION_KEY_PREFIX};
use crate::error::Result;
use crate::factory::CacheFactory;

/// First line of a verbose sweep.
pub const SWEEP_HEADER: &str = "Cleaning up stale session data from cache stores.";

/// Sessions removed from one store of one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepRemoval {
    /// `component/area`
    pub definition: String,
    pub store: String,
    /// Ended sessions whose data was removed
    pub sessions: usize,
    /// Entries deleted across those sessions
    pub entries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removals: Vec<SweepRemoval>,
}

impl SweepReport {
    pub fn sessions_removed(&self) -> usize {
        self.removals.iter().map(|r| r.sessions).sum()
    }

    pub fn entries_removed(&self) -> usize {
        self.removals.iter().map(|r| r.entries).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }
}

impl CacheFactory {
    // == Sweep ==
    /// Deletes the data of every session the oracle no longer knows, in
    /// every searchable store of every session-mode definition.
    ///
    /// With `verbose`, writes [`SWEEP_HEADER`] and one line per store that
    /// lost at least one session to `out`.
    pub fn clean_old_session_data(&self, verbose: bool, out: &mut dyn Write) -> Result<SweepReport> {
        if verbose {
            writeln!(out, "{SWEEP_HEADER}")?;
        }

        let mut report = SweepReport::default();
        for definition in self.session_definitions()? {
            for store in self.get_stores_for(&definition)? {
                let Some(search) = store.searchable() else {
                    debug!(store = store.name(), "skipping store that cannot enumerate keys");
                    continue;
                };

                let mut by_session: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for key in search.find_by_prefix(SESSION_KEY_PREFIX) {
                    if let Some(session_id) = session_id_from_key(&key) {
                        by_session.entry(session_id).or_default().push(key);
                    }
                }

                let mut sessions = 0;
                let mut entries = 0;
                for (session_id, keys) in &by_session {
                    if self.sessions().session_exists(session_id) {
                        continue;
                    }
                    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                    entries += store.delete_many(&refs);
                    sessions += 1;
                }
                if sessions == 0 {
                    continue;
                }

                if verbose {
                    writeln!(
                        out,
                        "- Removed {sessions} old {} sessions from the '{}' cache store.",
                        definition.id(),
                        store.name()
                    )?;
                }
                info!(
                    definition = %definition.id(),
                    store = store.name(),
                    sessions,
                    entries,
                    "removed stale session data"
                );
                report.removals.push(SweepRemoval {
                    definition: definition.id(),
                    store: store.name().to_string(),
                    sessions,
                    entries,
                });
            }
        }
        Ok(report)
    }

    // == Logout ==
    /// Removes one session's entries from every session-mode store, leaving
    /// other sessions alone. Returns the number of entries removed.
    pub fn remove_cache_for_session(&self, session_id: &str) -> Result<usize> {
        let prefix = session_prefix(session_id);
        let mut removed = 0;
        for definition in self.session_definitions()? {
            for store in self.get_stores_for(&definition)? {
                let Some(search) = store.searchable() else {
                    continue;
                };
                let keys = search.find_by_prefix(&prefix);
                let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                removed += store.delete_many(&refs);
            }
        }
        debug!(session = session_id, removed, "removed session cache data");
        Ok(removed)
    }
}
