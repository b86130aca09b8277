//! MemoryStore: a KvStore held entirely in process memory.
//!
//! Entries live in an ordered map so prefix operations are range scans.
//! Expired entries are invisible to reads immediately and are physically
//! dropped on overwrite, on delete, or by [`MemoryStore::purge_expired`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::StorageError;

use super::traits::{key_hex, KvStore, StorageResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => at > now,
            None => true,
        }
    }
}

/// In-memory store. Interior mutability via `parking_lot::Mutex`.
///
/// Expired entries stay in memory until overwritten or deleted; the owner
/// must call [`MemoryStore::purge_expired`] periodically to bound growth.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<Vec<u8>, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically held entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry whose TTL has passed. Returns the number dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "purged expired entries from memory store");
        }
        purged
    }

    fn keys_with_prefix(entries: &BTreeMap<Vec<u8>, Entry>, prefix: &[u8]) -> Vec<Vec<u8>> {
        entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        if value.is_empty() {
            return Err(StorageError::EmptyValue { key: key_hex(key) });
        }
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.lock().insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn delete(&self, key: &[u8]) -> StorageResult<usize> {
        Ok(usize::from(self.entries.lock().remove(key).is_some()))
    }

    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        let mut entries = self.entries.lock();
        let keys = Self::keys_with_prefix(&entries, prefix);
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}
