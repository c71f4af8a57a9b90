//! Rolling Sensor History
//!
//! Bounded per-(sensor_type, location) windows of SI values feeding anomaly
//! and trend detection. Two backends:
//! - `InMemoryHistoryStore`: process-local, lost on restart (default)
//! - `SledHistoryStore`: persisted in a sled tree, survives restarts
//!
//! Both are safe to share across threads. Each `append` is atomic, but a
//! read followed by an append is not; callers that need read-then-write
//! ordering per key must serialize those calls themselves.

use crate::config::defaults::SLED_HISTORY_TREE;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for history operations
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History lock poisoned")]
    LockPoisoned,
}

/// Identity of one rolling window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub sensor_type: String,
    pub location: String,
}

impl HistoryKey {
    pub fn new(sensor_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            location: location.into(),
        }
    }

    /// NUL-separated byte key for sled
    fn storage_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.sensor_type.len() + self.location.len() + 1);
        key.extend_from_slice(self.sensor_type.as_bytes());
        key.push(0);
        key.extend_from_slice(self.location.as_bytes());
        key
    }
}

impl std::fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.sensor_type, self.location)
    }
}

/// Trait for history backends
///
/// Implementations must be thread-safe; one store is shared by every
/// analysis call in the process.
pub trait HistoryStore: Send + Sync {
    /// Current window for a key, oldest first. Unknown keys yield an empty window.
    fn window(&self, key: &HistoryKey) -> Result<Vec<f64>, HistoryError>;

    /// Append a value, evicting the oldest so at most `max_len` remain.
    /// Returns the window length after the append.
    fn append(&self, key: &HistoryKey, value: f64, max_len: usize) -> Result<usize, HistoryError>;

    /// Drop the window for a key.
    fn clear(&self, key: &HistoryKey) -> Result<(), HistoryError>;

    /// Number of tracked keys
    fn key_count(&self) -> Result<usize, HistoryError>;

    /// Get the store name for logging
    fn store_name(&self) -> &'static str;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    windows: RwLock<HashMap<HistoryKey, VecDeque<f64>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn window(&self, key: &HistoryKey) -> Result<Vec<f64>, HistoryError> {
        let windows = self.windows.read().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(windows
            .get(key)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default())
    }

    fn append(&self, key: &HistoryKey, value: f64, max_len: usize) -> Result<usize, HistoryError> {
        let mut windows = self.windows.write().map_err(|_| HistoryError::LockPoisoned)?;
        let window = windows.entry(key.clone()).or_default();
        window.push_back(value);
        while window.len() > max_len {
            window.pop_front();
        }
        Ok(window.len())
    }

    fn clear(&self, key: &HistoryKey) -> Result<(), HistoryError> {
        let mut windows = self.windows.write().map_err(|_| HistoryError::LockPoisoned)?;
        windows.remove(key);
        Ok(())
    }

    fn key_count(&self) -> Result<usize, HistoryError> {
        let windows = self.windows.read().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(windows.len())
    }

    fn store_name(&self) -> &'static str {
        "InMemory"
    }
}

// ============================================================================
// Sled Backend
// ============================================================================

/// sled-backed history
///
/// Key: `sensor_type \0 location`
/// Value: JSON array of f64, oldest first
///
/// Writes are not flushed individually; sled flushes in the background and
/// `flush()` forces it (e.g. at the end of a replay).
#[derive(Clone)]
pub struct SledHistoryStore {
    tree: sled::Tree,
}

impl SledHistoryStore {
    /// Open or create the history database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    /// Use the history tree of an already open database
    pub fn with_db(db: &sled::Db) -> Result<Self, HistoryError> {
        let tree = db.open_tree(SLED_HISTORY_TREE)?;
        debug!(keys = tree.len(), "Opened sled history tree");
        Ok(Self { tree })
    }

    pub fn flush(&self) -> Result<usize, HistoryError> {
        Ok(self.tree.flush()?)
    }

    fn decode(bytes: &[u8]) -> Vec<f64> {
        match serde_json::from_slice::<Vec<f64>>(bytes) {
            Ok(window) => window,
            Err(e) => {
                warn!(error = %e, "Corrupt history window, starting fresh");
                Vec::new()
            }
        }
    }
}

impl HistoryStore for SledHistoryStore {
    fn window(&self, key: &HistoryKey) -> Result<Vec<f64>, HistoryError> {
        match self.tree.get(key.storage_key())? {
            // A corrupt window reads as empty; the next append overwrites it
            Some(bytes) => Ok(Self::decode(&bytes)),
            None => Ok(Vec::new()),
        }
    }

    fn append(&self, key: &HistoryKey, value: f64, max_len: usize) -> Result<usize, HistoryError> {
        let updated = self.tree.update_and_fetch(key.storage_key(), |old| {
            let mut window = old.map(Self::decode).unwrap_or_default();
            window.push(value);
            if window.len() > max_len {
                let excess = window.len() - max_len;
                window.drain(..excess);
            }
            // On encode failure keep the previous value rather than deleting the key
            serde_json::to_vec(&window)
                .ok()
                .or_else(|| old.map(<[u8]>::to_vec))
        })?;

        Ok(updated.map_or(0, |bytes| Self::decode(&bytes).len()))
    }

    fn clear(&self, key: &HistoryKey) -> Result<(), HistoryError> {
        self.tree.remove(key.storage_key())?;
        Ok(())
    }

    fn key_count(&self) -> Result<usize, HistoryError> {
        Ok(self.tree.len())
    }

    fn store_name(&self) -> &'static str {
        "Sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_window_bound(store: &dyn HistoryStore) {
        let key = HistoryKey::new("noise", "Atelier B");
        for i in 0..10 {
            store.append(&key, i as f64, 4).expect("append");
        }
        assert_eq!(store.window(&key).expect("window"), vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(store.key_count().expect("count"), 1);

        store.clear(&key).expect("clear");
        assert!(store.window(&key).expect("window").is_empty());
    }

    #[test]
    fn test_in_memory_window_is_bounded() {
        exercise_window_bound(&InMemoryHistoryStore::new());
    }

    #[test]
    fn test_sled_window_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SledHistoryStore::open(dir.path().join("history.db")).expect("open");
        exercise_window_bound(&store);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = InMemoryHistoryStore::new();
        let a = HistoryKey::new("temperature", "Zone A");
        let b = HistoryKey::new("temperature", "Zone B");
        store.append(&a, 21.0, 100).unwrap();
        store.append(&b, 30.0, 100).unwrap();
        assert_eq!(store.window(&a).unwrap(), vec![21.0]);
        assert_eq!(store.window(&b).unwrap(), vec![30.0]);
    }

    #[test]
    fn test_sled_history_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.db");
        let key = HistoryKey::new("co2", "Bureau 2");
        {
            let store = SledHistoryStore::open(&path).expect("open");
            store.append(&key, 800.0, 100).unwrap();
            store.append(&key, 820.0, 100).unwrap();
            store.flush().unwrap();
        }
        let store = SledHistoryStore::open(&path).expect("reopen");
        assert_eq!(store.window(&key).unwrap(), vec![800.0, 820.0]);
    }

    #[test]
    fn test_corrupt_sled_window_recovers_on_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SledHistoryStore::open(dir.path().join("history.db")).expect("open");
        let key = HistoryKey::new("noise", "A");
        store.tree.insert(key.storage_key(), b"not json".to_vec()).unwrap();

        assert!(store.window(&key).unwrap().is_empty());
        assert_eq!(store.append(&key, 72.0, 100).unwrap(), 1);
        assert_eq!(store.window(&key).unwrap(), vec![72.0]);
    }

    #[test]
    fn test_storage_key_is_unambiguous() {
        let a = HistoryKey::new("a/b", "c");
        let b = HistoryKey::new("a", "b/c");
        assert_ne!(a.storage_key(), b.storage_key());
    }
}
