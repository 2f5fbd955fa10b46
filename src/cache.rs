//! # Record Cache
//!
//! Durable key/value persistence for the canonical collection and its
//! pagination snapshot.
//!
//! The engine never talks to a store directly. [`RecordCache`] owns the two
//! fixed keys, the encoding (named MessagePack via `rmp-serde`) and the
//! best-effort policy: reads that fail to decode are a cache miss, never an
//! error. Store calls are blocking and are moved off the async executor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::types::{CachedPaginationInfo, Record};

// ============================================================================
// Key/Value Store
// ============================================================================

/// Durable key/value contract consumed by the record cache.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write every entry or none of them.
    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<()>;

    fn remove_all(&self, keys: &[String]) -> Result<()>;
}

/// In-memory store. Survives nothing; used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Overwrite a raw value, bypassing encoding.
    pub fn put_raw(&self, key: &str, value: Vec<u8>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[String]) -> Result<()> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

// ============================================================================
// Record Cache Adapter
// ============================================================================

/// Cached collection and pagination snapshot, both optional.
pub type CachedState = (Option<Vec<Record>>, Option<CachedPaginationInfo>);

/// Adapter that stores the collection and pagination info under fixed keys.
#[derive(Clone)]
pub struct RecordCache {
    store: Arc<dyn KeyValueStore>,
    list_key: String,
    pagination_key: String,
}

impl RecordCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &SyncConfig) -> Self {
        Self::with_keys(
            store,
            config.list_cache_key.clone(),
            config.pagination_cache_key.clone(),
        )
    }

    pub fn with_keys(
        store: Arc<dyn KeyValueStore>,
        list_key: impl Into<String>,
        pagination_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            list_key: list_key.into(),
            pagination_key: pagination_key.into(),
        }
    }

    /// Read the cached state. Any failure is logged and reported as a miss.
    pub async fn load(&self) -> CachedState {
        let store = Arc::clone(&self.store);
        let list_key = self.list_key.clone();
        let pagination_key = self.pagination_key.clone();

        let read = tokio::task::spawn_blocking(move || {
            let records = store
                .get(&list_key)
                .and_then(|bytes| bytes.map(|b| decode::<Vec<Record>>(&b)).transpose());
            let info = store.get(&pagination_key).and_then(|bytes| {
                bytes
                    .map(|b| decode::<CachedPaginationInfo>(&b))
                    .transpose()
            });
            (records, info)
        })
        .await;

        let (records, info) = match read {
            Ok(parts) => parts,
            Err(e) => {
                warn!("[RecordCache] Cache read task failed: {}", e);
                return (None, None);
            }
        };

        let info = match info {
            Ok(Some(info)) if !info.is_current_version() => {
                warn!(
                    "[RecordCache] Ignoring cache written with format version {}",
                    info.version
                );
                return (None, None);
            }
            Ok(info) => info,
            Err(e) => {
                warn!("[RecordCache] Discarding unreadable pagination info: {}", e);
                None
            }
        };

        let records = match records {
            Ok(records) => records,
            Err(e) => {
                warn!("[RecordCache] Discarding unreadable record list: {}", e);
                None
            }
        };

        debug!(
            "[RecordCache] Loaded {} cached records (pagination info: {})",
            records.as_ref().map_or(0, Vec::len),
            info.is_some()
        );
        (records, info)
    }

    /// Overwrite both keys in one atomic write.
    pub async fn save(&self, records: &[Record], info: &CachedPaginationInfo) -> Result<()> {
        let entries = vec![
            (self.list_key.clone(), rmp_serde::to_vec_named(records)?),
            (self.pagination_key.clone(), rmp_serde::to_vec_named(info)?),
        ];
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.put_all(&entries)).await??;
        Ok(())
    }

    /// Remove both keys.
    pub async fn clear(&self) -> Result<()> {
        let keys = vec![self.list_key.clone(), self.pagination_key.clone()];
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.remove_all(&keys)).await??;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(SyncError::from)
}
