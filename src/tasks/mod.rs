//! Background Tasks Module
//!
//! Contains background tasks that run periodically.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired entries from hosted namespaces
//! - Session Sweep: Removes cached data of ended sessions

mod cleanup;
mod sweep;

pub use cleanup::spawn_cleanup_task;
pub use sweep::spawn_session_sweep_task;
