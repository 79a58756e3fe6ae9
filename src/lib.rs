//! cacheplex - a multi-mode cache layer over pluggable stores
//!
//! Application, session and request caches resolved from configuration,
//! served by memory, file or networked stores, plus the store server the
//! networked backend talks to.

pub mod api;
pub mod cache;
pub mod config;
pub mod definition;
pub mod error;
pub mod factory;
pub mod models;
pub mod session;
pub mod store;
pub mod tasks;
pub mod value;

pub use api::{AppState, StoreHost};
pub use cache::{Cache, CacheScope};
pub use config::{CacheConfig, ConfigSource, Settings, StoreConfig};
pub use definition::{Definition, KeyPrefix, Mode};
pub use error::{CacheError, Result};
pub use factory::CacheFactory;
pub use session::{FixedSession, SessionContext, SessionOracle, SessionRegistry, SweepReport};
pub use store::{SearchableStore, Store, StoreFeatures, StoreKind};
pub use tasks::{spawn_cleanup_task, spawn_session_sweep_task};
pub use value::{CacheValue, ObjectRef};
