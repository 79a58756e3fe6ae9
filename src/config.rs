//! Configuration Module
//!
//! Process settings come from environment variables; cache stores, mode
//! mappings and definitions come from a read-only TOML document.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::definition::{KeyPrefix, Mode};
use crate::error::{CacheError, Result};
use crate::store::StoreKind;

/// Store server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of entries per hosted namespace (0 = unbounded)
    pub max_entries: usize,
    /// Default TTL in seconds for hosted entries (0 = no expiry)
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Settings {
    /// Creates new Settings by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum entries per namespace (default: 10000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: 0,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// == Cache Configuration ==

/// One configured store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Display name, unique within the configuration
    pub name: String,
    pub kind: StoreKind,
    /// Root directory for file stores
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Base URL of the store server for remote stores
    #[serde(default)]
    pub url: Option<String>,
    /// Entry limit for memory stores (0 = unbounded)
    #[serde(default)]
    pub max_entries: usize,
    /// Request timeout for remote stores
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2_000
}

impl StoreConfig {
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StoreKind::Memory,
            path: None,
            url: None,
            max_entries: 0,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            kind: StoreKind::File,
            ..Self::memory(name)
        }
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            kind: StoreKind::Remote,
            ..Self::memory(name)
        }
    }
}

/// Default store names per mode, tried in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeMappings {
    #[serde(default)]
    pub application: Vec<String>,
    #[serde(default)]
    pub session: Vec<String>,
    #[serde(default)]
    pub request: Vec<String>,
}

impl ModeMappings {
    pub fn for_mode(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Application => &self.application,
            Mode::Session => &self.session,
            Mode::Request => &self.request,
        }
    }
}

/// One configured cache definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionConfig {
    pub component: String,
    pub area: String,
    pub mode: Mode,
    /// Entry lifetime in seconds (0 = no expiry)
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub requires_searchable: bool,
    /// Overrides the partitioning implied by `mode`
    #[serde(default)]
    pub key_prefix: Option<KeyPrefix>,
    /// Explicit store mapping, primary first
    #[serde(default)]
    pub stores: Vec<String>,
}

/// Full cache configuration.
///
/// ```toml
/// [[stores]]
/// name = "File test"
/// kind = "file"
/// path = "/var/cache/app"
///
/// [mode_mappings]
/// session = ["File test"]
///
/// [[definitions]]
/// component = "core"
/// area = "userselections"
/// mode = "session"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub mode_mappings: ModeMappings,
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,
}

impl CacheConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: CacheConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Checks uniqueness of store names and definitions and that every
    /// mapping names a configured store.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for store in &self.stores {
            if !names.insert(store.name.as_str()) {
                return Err(CacheError::Config(format!(
                    "store '{}' is configured twice",
                    store.name
                )));
            }
        }

        let mut ids = HashSet::new();
        for definition in &self.definitions {
            if !ids.insert((definition.component.as_str(), definition.area.as_str())) {
                return Err(CacheError::Config(format!(
                    "definition {}/{} is configured twice",
                    definition.component, definition.area
                )));
            }
        }

        let mapped = Mode::ALL
            .iter()
            .flat_map(|mode| self.mode_mappings.for_mode(*mode))
            .chain(self.definitions.iter().flat_map(|d| &d.stores));
        for name in mapped {
            if !names.contains(name.as_str()) {
                return Err(CacheError::Config(format!(
                    "mapping references unknown store '{name}'"
                )));
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    /// Memory stores for application and request caches, a file store under
    /// the system temp directory for session caches, no definitions.
    fn default() -> Self {
        Self {
            stores: vec![
                StoreConfig::memory("default_application"),
                StoreConfig::memory("default_request"),
                StoreConfig::file("default_session", env::temp_dir().join("cacheplex")),
            ],
            mode_mappings: ModeMappings {
                application: vec!["default_application".to_string()],
                session: vec!["default_session".to_string()],
                request: vec!["default_request".to_string()],
            },
            definitions: Vec::new(),
        }
    }
}

// == Configuration Source ==
/// Read-only provider of cache configuration.
pub trait ConfigSource: Send + Sync {
    /// Definitions in configuration order.
    fn definitions(&self) -> Vec<DefinitionConfig>;

    fn stores(&self) -> Vec<StoreConfig>;

    /// Default store names for a mode, tried in order.
    fn mode_mapping(&self, mode: Mode) -> Vec<String>;
}

impl ConfigSource for CacheConfig {
    fn definitions(&self) -> Vec<DefinitionConfig> {
        self.definitions.clone()
    }

    fn stores(&self) -> Vec<StoreConfig> {
        self.stores.clone()
    }

    fn mode_mapping(&self, mode: Mode) -> Vec<String> {
        self.mode_mappings.for_mode(mode).to_vec()
    }
}
