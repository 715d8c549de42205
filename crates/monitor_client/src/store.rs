//! Key-value storage backends for session fields and the in-flight batch id.
//!
//! Durable storage outlives the process (a RON file); per-tab storage may be
//! in-memory or file backed depending on how long a "tab" lives for the caller.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use monitor_logging::{monitor_debug, monitor_warn};
use thiserror::Error;

use crate::persist::StateDir;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode store: {0}")]
    Encode(String),
    #[error("failed to decode store {path:?}: {message}")]
    Decode { path: PathBuf, message: String },
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// File-backed store: a RON map rewritten atomically on every change.
#[derive(Debug)]
pub struct RonFileStore {
    dir: StateDir,
    filename: String,
    entries: Mutex<BTreeMap<String, String>>,
}

impl RonFileStore {
    /// Open `path`, starting empty if it does not exist yet. The parent directory is created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::StateDir(format!("not a file path: {path:?}")))?
            .to_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => StateDir::open(parent)?,
            _ => StateDir::open(".")?,
        };

        let entries: BTreeMap<String, String> = match fs::read_to_string(path) {
            Ok(text) => ron::from_str(&text).map_err(|err| StoreError::Decode {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                monitor_debug!("No store at {:?}, starting empty", path);
                BTreeMap::new()
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        Ok(Self {
            dir,
            filename,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.file(&self.filename)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(entries, pretty)
            .map_err(|err| StoreError::Encode(err.to_string()))?;
        self.dir.replace(&self.filename, &content)?;
        Ok(())
    }

    fn modify(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        apply(&mut next);
        if next == *entries {
            return Ok(());
        }
        if let Err(err) = self.flush(&next) {
            monitor_warn!("Failed to write store {:?}: {}", self.path(), err);
            return Err(err);
        }
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for RonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
