//! TTL Cleanup Task
//!
//! Background task that periodically removes expired entries from every
//! namespace of a store server.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::StoreHost;

/// Spawns a background task that periodically cleans up expired entries.
///
/// The returned handle can be aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let host = Arc::new(StoreHost::new(1000, None));
/// let cleanup_handle = spawn_cleanup_task(host.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(host: Arc<StoreHost>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = host.cleanup_expired().await;
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
