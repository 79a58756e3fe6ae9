//! Session Sweep Task
//!
//! Background task that periodically removes the cached data of sessions
//! that no longer exist.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::factory::CacheFactory;

/// Spawns a task running [`CacheFactory::clean_old_session_data`] every
/// `interval`. Store I/O is blocking, so each sweep runs on the blocking pool.
pub fn spawn_session_sweep_task(factory: Arc<CacheFactory>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Starting session sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let factory = Arc::clone(&factory);
            let swept = tokio::task::spawn_blocking(move || {
                factory.clean_old_session_data(false, &mut io::sink())
            })
            .await;

            match swept {
                Ok(Ok(report)) if report.is_empty() => {
                    debug!("Session sweep: no stale sessions found");
                }
                Ok(Ok(report)) => info!(
                    sessions = report.sessions_removed(),
                    entries = report.entries_removed(),
                    "Session sweep: removed stale session data"
                ),
                Ok(Err(err)) => warn!(error = %err, "Session sweep failed"),
                Err(err) => warn!(error = %err, "Session sweep task panicked"),
            }
        }
    })
}
