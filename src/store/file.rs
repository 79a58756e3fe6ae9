//! File Store Module
//!
//! One directory per definition, one JSON record per key. Writes land in a
//! temporary file in the same directory, are synced, then atomically renamed
//! into place, so concurrent readers in other processes never observe a
//! partial record.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, warn};

use super::{CacheEntry, SearchableStore, Store, StoreKind};
use crate::definition::Definition;
use crate::error::{CacheError, Result};
use crate::value::CacheValue;

const RECORD_SUFFIX: &str = ".cache";

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME: usize = 255;

// == File Store ==
#[derive(Debug)]
pub struct FileStore {
    name: String,
    dir: PathBuf,
    ttl: Option<std::time::Duration>,
    /// Keeps a private temporary root alive for isolated instances
    _scratch: Option<TempDir>,
}

impl FileStore {
    /// Opens the store for `definition` under `root`, creating its
    /// directory `root/<component>/<area>` if needed.
    pub fn open(name: &str, root: &Path, definition: &Definition) -> Result<Self> {
        let dir = root
            .join(escape_segment(definition.component()))
            .join(escape_segment(definition.area()));
        fs::create_dir_all(&dir)?;
        debug!(store = name, dir = %dir.display(), "opened file store");

        Ok(Self {
            name: name.to_string(),
            dir,
            ttl: definition.ttl(),
            _scratch: None,
        })
    }

    /// Opens a store under a fresh temporary root that is removed on drop.
    pub fn temporary(name: &str, definition: &Definition) -> Result<Self> {
        let scratch = TempDir::new()?;
        let mut store = Self::open(name, scratch.path(), definition)?;
        store._scratch = Some(scratch);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let file_name = format!("{}{}", escape_segment(key), RECORD_SUFFIX);
        if file_name.len() > MAX_FILE_NAME {
            return Err(CacheError::InvalidRequest(format!(
                "key too long for a file store ({} bytes)",
                key.len()
            )));
        }
        Ok(self.dir.join(file_name))
    }

    fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        if entry.is_expired() {
            remove_if_present(&path)?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn write_entry(&self, key: &str, value: &CacheValue) -> Result<()> {
        let path = self.path_for(key)?;
        let entry = CacheEntry::new(value.encode_portable()?, self.ttl);

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&serde_json::to_vec(&entry)?)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|err| CacheError::Io(err.error))?;
        Ok(())
    }

    fn record_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let file_name = dir_entry?.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(RECORD_SUFFIX).and_then(unescape_segment) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn try_find(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for key in self.record_keys()? {
            if !key.starts_with(prefix) {
                continue;
            }
            match self.read_entry(&key) {
                Ok(Some(_)) => keys.push(key),
                Ok(None) => {}
                Err(err) => self.discard_unreadable(&key, &err),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Drops a record that cannot be read back. Undecodable records are
    /// deleted; other failures leave the file for a later attempt.
    fn discard_unreadable(&self, key: &str, err: &CacheError) {
        warn!(store = %self.name, key, error = %err, "skipping unreadable record");
        if !matches!(err, CacheError::Serialization(_)) {
            return;
        }
        if let Err(err) = self.path_for(key).and_then(|path| remove_if_present(&path)) {
            warn!(store = %self.name, key, error = %err, "could not remove unreadable record");
        }
    }

    fn try_purge(&self) -> Result<()> {
        for key in self.record_keys()? {
            remove_if_present(&self.path_for(&key)?)?;
        }
        Ok(())
    }
}

impl Store for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::File
    }

    fn get(&self, key: &str) -> Option<CacheValue> {
        let decoded = self
            .read_entry(key)
            .and_then(|entry| entry.map(|e| e.value.decode()).transpose());
        match decoded {
            Ok(value) => value,
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "file store read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &CacheValue) -> bool {
        match self.write_entry(key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "file store write failed");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        let was_live = matches!(self.read_entry(key), Ok(Some(_)));
        let removed = self
            .path_for(key)
            .and_then(|path| remove_if_present(&path));
        match removed {
            Ok(existed) => existed && was_live,
            Err(err) => {
                warn!(store = %self.name, key, error = %err, "file store delete failed");
                false
            }
        }
    }

    fn purge(&self) -> bool {
        match self.try_purge() {
            Ok(()) => true,
            Err(err) => {
                warn!(store = %self.name, error = %err, "file store purge failed");
                false
            }
        }
    }

    fn searchable(&self) -> Option<&dyn SearchableStore> {
        Some(self)
    }
}

impl SearchableStore for FileStore {
    fn find_by_prefix(&self, prefix: &str) -> Vec<String> {
        self.try_find(prefix).unwrap_or_else(|err| {
            warn!(store = %self.name, prefix, error = %err, "file store search failed");
            Vec::new()
        })
    }
}

/// Returns whether the file existed.
fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Maps a string to a file-name-safe form. ASCII alphanumerics, `-` and `_`
/// pass through; every other byte becomes `%xx`, so the mapping is
/// reversible and distinct inputs never share a name.
fn escape_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02x}"));
        }
    }
    out
}

fn unescape_segment(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let pair = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(pair, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
