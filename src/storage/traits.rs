//! The key-value capability the mapper consumes.
//!
//! Implementations may evict entries once their TTL passes, but the mapper
//! does not depend on it: every record carries its own expiry and is checked
//! on read.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Synchronous byte-keyed store with optional per-entry TTL and prefix operations.
pub trait KvStore: Send + Sync {
    /// Store `value` at `key`. Empty values are rejected, since an empty read means "not found".
    fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> StorageResult<()>;

    /// Value at `key`, or `None` when missing or evicted.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Remove `key`. Returns the number of removed entries (0 or 1).
    fn delete(&self, key: &[u8]) -> StorageResult<usize>;

    /// Remove every entry whose key starts with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize>;

    /// Live entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        (**self).put(key, value, ttl)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<usize> {
        (**self).delete(key)
    }

    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        (**self).delete_prefix(prefix)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }
}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        (**self).put(key, value, ttl)
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &[u8]) -> StorageResult<usize> {
        (**self).delete(key)
    }

    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        (**self).delete_prefix(prefix)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }
}

/// Hex rendering of a key for error messages and logs.
pub(crate) fn key_hex(key: &[u8]) -> String {
    hex::encode(key)
}
