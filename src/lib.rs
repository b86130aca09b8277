//! Hierarchical pseudonymization with erasable mappings.
//!
//! A path such as `tenant/user/session` is turned into a salted hash chain.
//! Each prefix of the path owns a [`PrivateRecord`] with its own random salt
//! and public id; records expire unless read again, and a node can be erased
//! together with all of its descendants in one prefix delete.

pub mod api;
pub mod config;
pub mod error;
pub mod hasher;
pub mod mapper;
pub mod record;
pub mod storage;

pub use api::{
    bulk_query, clear_path, parse_path, query_path, split_segments, ttl_override, ApiEnvelope,
    Status,
};
pub use config::{parse_ttl, MapperOptions, DEFAULT_LIVE_TTL};
pub use error::{MapperError, Result, StorageError};
pub use hasher::{HashChain, HierarchicalHasher};
pub use mapper::GdprMapper;
pub use record::{PrivateRecord, PublicResultRecord};
pub use storage::memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use storage::sqlite::SqliteStore;
pub use storage::traits::KvStore;
