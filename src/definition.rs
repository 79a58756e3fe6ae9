//! Cache Definition Module
//!
//! Immutable descriptors of logical caches and the modes they run in.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DefinitionConfig;

// == Mode ==
/// Scope a cache's data lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Shared by the whole process
    Application,
    /// Partitioned per user session
    Session,
    /// Lives for a single request
    Request,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Application, Mode::Session, Mode::Request];

    const fn bit(self) -> u8 {
        match self {
            Mode::Application => 0b001,
            Mode::Session => 0b010,
            Mode::Request => 0b100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Application => "application",
            Mode::Session => "session",
            Mode::Request => "request",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Mode Set ==
/// Bitmask of modes a store kind can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const NONE: ModeSet = ModeSet(0);

    pub const fn of(modes: &[Mode]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < modes.len() {
            bits |= modes[i].bit();
            i += 1;
        }
        ModeSet(bits)
    }

    pub const fn contains(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// Modes in declaration order.
    pub fn modes(self) -> Vec<Mode> {
        Mode::ALL.into_iter().filter(|m| self.contains(*m)).collect()
    }
}

// == Key Prefix ==
/// How logical keys are partitioned inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPrefix {
    None,
    PerSession,
    PerRequest,
}

impl KeyPrefix {
    /// The partitioning a mode gets unless configured otherwise.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Application => KeyPrefix::None,
            Mode::Session => KeyPrefix::PerSession,
            Mode::Request => KeyPrefix::PerRequest,
        }
    }
}

// == Definition ==
/// Descriptor of one logical cache, identified by `component/area`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    component: String,
    area: String,
    mode: Mode,
    ttl: Option<Duration>,
    requires_searchable: bool,
    key_prefix: KeyPrefix,
    stores: Vec<String>,
    adhoc: bool,
}

impl Definition {
    /// Builds a definition from a configuration entry.
    pub fn from_config(config: &DefinitionConfig) -> Self {
        Self {
            component: config.component.clone(),
            area: config.area.clone(),
            mode: config.mode,
            ttl: (config.ttl > 0).then(|| Duration::from_secs(config.ttl)),
            requires_searchable: config.requires_searchable,
            key_prefix: config
                .key_prefix
                .unwrap_or_else(|| KeyPrefix::for_mode(config.mode)),
            stores: config.stores.clone(),
            adhoc: false,
        }
    }

    /// A definition that exists outside any configuration, for direct
    /// bindings such as isolated test instances.
    pub fn adhoc(mode: Mode, component: impl Into<String>, area: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            area: area.into(),
            mode,
            ttl: None,
            requires_searchable: false,
            key_prefix: KeyPrefix::for_mode(mode),
            stores: Vec::new(),
            adhoc: true,
        }
    }

    /// Sets the entry lifetime; a zero duration means no expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn requiring_search(mut self) -> Self {
        self.requires_searchable = true;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: KeyPrefix) -> Self {
        self.key_prefix = key_prefix;
        self
    }

    /// `component/area`
    pub fn id(&self) -> String {
        format!("{}/{}", self.component, self.area)
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn requires_searchable(&self) -> bool {
        self.requires_searchable
    }

    pub fn key_prefix(&self) -> KeyPrefix {
        self.key_prefix
    }

    /// Store names explicitly mapped to this definition, primary first.
    pub fn store_names(&self) -> &[String] {
        &self.stores
    }

    pub fn is_adhoc(&self) -> bool {
        self.adhoc
    }
}
