//! Ready-made [`KeyValueStore`] implementations.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::{KeyValueStore, StoreError};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// A process-local store. Nothing survives a restart unless the same
/// instance is handed to the next manager.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Value>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// A store backed by a single JSON object on disk.
///
/// The whole document is cached in memory and rewritten on every `set` or
/// `delete`. Writes go to a sibling temp file first and are then renamed
/// over the original, so a crash mid-write leaves the previous document
/// intact rather than a truncated one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store. A file that exists but isn't a
    /// JSON object is an error, so a corrupted store is noticed rather
    /// than silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = document.len(), "opened JSON store");
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document(&self) -> Result<MutexGuard<'_, Map<String, Value>>, StoreError> {
        self.document.lock().map_err(|_| StoreError::Poisoned)
    }

    fn flush(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.document()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut document = self.document()?;
        document.insert(key.to_owned(), value);
        self.flush(&document)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut document = self.document()?;
        if document.remove(key).is_some() {
            self.flush(&document)?;
        }
        Ok(())
    }
}
