//! Durable key-value backends for the report store.
//!
//! A backend only moves strings in and out of storage; it knows nothing
//! about reports. Last write wins when several stores share one backend.

use crate::error::StorageError;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

/// Key-value storage for serialized report collections.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, or `None` if nothing is stored.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, String>,
    writes: Vec<(String, String)>,
    fail_writes: bool,
}

/// In-process backend.
///
/// Clones share the same records, so a clone handed to a fresh
/// `ReportStore` behaves like storage that survived a restart. Every
/// successful write is recorded for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl MemoryBackend {
    /// Create a backend that already holds `value` under `key`.
    pub fn with_record(key: &str, value: impl Into<String>) -> Self {
        let backend = Self::new();
        backend
            .lock()
            .records
            .insert(key.to_string(), value.into());
        backend
    }

    /// Make subsequent writes fail, as a full or unavailable store would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Current value under `key`.
    pub fn record(&self, key: &str) -> Option<String> {
        self.lock().records.get(key).cloned()
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().records.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        state.records.insert(key.to_string(), value.to_string());
        state.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Backend that keeps one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No stored library at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        // Write next to the target so the rename stays on one filesystem.
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.as_file().sync_all()?;

        let path = self.path_for(key);
        temp.persist(&path).map_err(|e| e.error)?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}
