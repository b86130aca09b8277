//! GdprMapper: query, import and erase hierarchical pseudonyms.
//!
//! Every query walks the hash chain from the root: each prefix of the path
//! gets its own record, created on first read and refreshed on every later
//! read. Erasing a node is a prefix delete over its storage key, which by the
//! packing scheme also covers every descendant.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::MapperOptions;
use crate::error::{MapperError, Result};
use crate::hasher::HierarchicalHasher;
use crate::record::PrivateRecord;
use crate::storage::traits::{key_hex, KvStore};

/// Pseudonymization engine over a [`KvStore`].
///
/// Holds no mutable state of its own; all methods take `&self` and can be
/// called concurrently when the store allows it.
pub struct GdprMapper<S: KvStore> {
    store: S,
    hasher: HierarchicalHasher,
    default_ttl: Duration,
}

impl<S: KvStore> GdprMapper<S> {
    pub fn new(store: S, global_salt: &[u8], default_ttl: Duration) -> Self {
        Self {
            store,
            hasher: HierarchicalHasher::new(global_salt),
            default_ttl,
        }
    }

    /// Build from options, generating a global salt if none is configured.
    pub fn from_options(store: S, options: &MapperOptions) -> Result<Self> {
        let salt = zeroize::Zeroizing::new(options.resolve_global_salt()?);
        Ok(Self::new(store, &salt, options.default_ttl()))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Fetch-or-create the record for every prefix of `segments` and return the leaf.
    ///
    /// `ttl` overrides the default lifetime for every record touched.
    pub fn query<T: AsRef<[u8]>>(
        &self,
        segments: &[T],
        ttl: Option<Duration>,
    ) -> Result<PrivateRecord> {
        let (_, record) = self.materialize(segments, ttl)?;
        Ok(record)
    }

    /// Query `segments`, then replace the leaf's public id with `public_id`.
    ///
    /// Used to import identifiers that were issued elsewhere. Salt, original id
    /// and expiry of the leaf are kept.
    pub fn set<T: AsRef<[u8]>>(
        &self,
        segments: &[T],
        public_id: &[u8],
        ttl: Option<Duration>,
    ) -> Result<PrivateRecord> {
        let (leaf_key, mut record) = self.materialize(segments, ttl)?;
        record.public_id = public_id.to_vec();
        let bytes = record.encode()?;
        self.store
            .put(&leaf_key, &bytes, Some(ttl.unwrap_or(self.default_ttl)))?;
        tracing::debug!(depth = segments.len(), "imported public id");
        Ok(record)
    }

    /// Remove the node at `segments` and all of its descendants.
    ///
    /// Returns the number of entries physically removed. Ancestors are untouched.
    pub fn clear_prefix<T: AsRef<[u8]>>(&self, segments: &[T]) -> Result<usize> {
        if segments.is_empty() {
            return Err(MapperError::NoPrefixProvided);
        }
        let prefix = self.hasher.chain(segments).leaf_key();
        let removed = self.store.delete_prefix(&prefix)?;
        tracing::info!(depth = segments.len(), removed, "cleared prefix");
        Ok(removed)
    }

    /// Number of live records at or below `segments`, without touching them.
    pub fn subtree_len<T: AsRef<[u8]>>(&self, segments: &[T]) -> Result<usize> {
        if segments.is_empty() {
            return Err(MapperError::NoPrefixProvided);
        }
        let prefix = self.hasher.chain(segments).leaf_key();
        let now = Utc::now();
        let mut live = 0;
        for (_, value) in self.store.scan_prefix(&prefix)? {
            if value.is_empty() {
                continue;
            }
            if !PrivateRecord::decode(&value)?.is_expired_at(now) {
                live += 1;
            }
        }
        Ok(live)
    }

    // -----------------------------------------------------------------------
    // Record lifecycle
    // -----------------------------------------------------------------------

    /// Walk the chain root-first; returns the leaf key and leaf record.
    fn materialize<T: AsRef<[u8]>>(
        &self,
        segments: &[T],
        ttl: Option<Duration>,
    ) -> Result<(Vec<u8>, PrivateRecord)> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let chain = self.hasher.chain(segments);

        let mut leaf = None;
        for (key, segment) in chain.prefix_keys().zip(segments) {
            let record = self.get_or_create(&key, segment.as_ref(), ttl)?;
            leaf = Some((key, record));
        }
        leaf.ok_or(MapperError::NoPrefixProvided)
    }

    fn get_or_create(&self, key: &[u8], original_id: &[u8], ttl: Duration) -> Result<PrivateRecord> {
        let now = Utc::now();
        match self.find_live_record(key, now, ttl)? {
            Some(record) => Ok(record),
            None => self.create_record(key, original_id, now, ttl),
        }
    }

    /// Refresh and return the record at `key`; `None` if missing or expired.
    fn find_live_record(
        &self,
        key: &[u8],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<PrivateRecord>> {
        let bytes = match self.store.get(key)? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Ok(None),
        };
        let mut record = PrivateRecord::decode(&bytes)?;

        // The store may not have evicted it yet.
        if record.is_expired_at(now) {
            self.store.delete(key)?;
            tracing::debug!(key = %key_hex(key), "dropped expired record");
            return Ok(None);
        }

        record.alive_until = expiry(now, ttl)?;
        self.store.put(key, &record.encode()?, Some(ttl))?;
        tracing::debug!(key = %key_hex(key), alive_until = %record.alive_until, "refreshed record");
        Ok(Some(record))
    }

    fn create_record(
        &self,
        key: &[u8],
        original_id: &[u8],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<PrivateRecord> {
        let record = PrivateRecord::new(original_id, expiry(now, ttl)?)?;
        self.store.put(key, &record.encode()?, Some(ttl))?;
        tracing::debug!(key = %key_hex(key), alive_until = %record.alive_until, "created record");
        Ok(record)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| MapperError::InvalidTtl(format!("{ttl:?} is out of range")))
}
