use thiserror::Error;

/// Failures raised by a [`KvStore`](crate::storage::traits::KvStore) implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Refusing to store an empty value at key {key}")]
    EmptyValue { key: String },

    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("no prefix provided")]
    NoPrefixProvided,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Random number generation failed: {0}")]
    Randomness(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}

impl From<serde_json::Error> for MapperError {
    fn from(e: serde_json::Error) -> Self {
        MapperError::Encoding(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
