//! Private mapping records and their public projection.
//!
//! A [`PrivateRecord`] holds the per-record salt that makes its public id
//! irreversible. It is persisted as JSON with byte fields base64-encoded and
//! is never handed out as-is: callers outside the engine only ever see a
//! [`PublicResultRecord`].

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{MapperError, Result};

/// Number of random bytes in a record salt.
pub const SALT_LENGTH: usize = 32;

// ============================================================================
// PrivateRecord
// ============================================================================

/// The stored side of a mapping: original id, its secret salt and the derived public id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct PrivateRecord {
    #[serde(rename = "originalID", with = "base64_bytes")]
    pub original_id: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(rename = "publicID", with = "base64_bytes")]
    pub public_id: Vec<u8>,
    #[zeroize(skip)]
    pub alive_until: DateTime<Utc>,
}

impl PrivateRecord {
    /// Create a record with a fresh random salt and `public_id = SHA256(salt || original_id)`.
    pub fn new(original_id: &[u8], alive_until: DateTime<Utc>) -> Result<Self> {
        let salt = generate_salt()?;
        let public_id = derive_public_id(&salt, original_id);
        Ok(Self {
            original_id: original_id.to_vec(),
            salt: salt.to_vec(),
            public_id,
            alive_until,
        })
    }

    /// Whether the record's lifetime ended before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.alive_until < now
    }

    /// Export form: base64 ids and expiry, no salt.
    pub fn public_version(&self) -> PublicResultRecord {
        PublicResultRecord {
            original_id: URL_SAFE.encode(&self.original_id),
            public_id: URL_SAFE.encode(&self.public_id),
            alive_until: self.alive_until,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// The salt must never end up in logs.
impl fmt::Debug for PrivateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateRecord")
            .field("original_id", &URL_SAFE.encode(&self.original_id))
            .field("salt", &"<redacted>")
            .field("public_id", &URL_SAFE.encode(&self.public_id))
            .field("alive_until", &self.alive_until)
            .finish()
    }
}

// ============================================================================
// PublicResultRecord
// ============================================================================

/// Externally visible projection of a [`PrivateRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicResultRecord {
    #[serde(rename = "originalID")]
    pub original_id: String,
    #[serde(rename = "publicID")]
    pub public_id: String,
    #[serde(rename = "aliveUntil")]
    pub alive_until: DateTime<Utc>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Fill a salt from the OS random source. There is no fallback source.
pub fn generate_salt() -> Result<[u8; SALT_LENGTH]> {
    let mut salt = [0u8; SALT_LENGTH];
    getrandom::getrandom(&mut salt).map_err(|e| MapperError::Randomness(e.to_string()))?;
    Ok(salt)
}

/// `SHA256(salt || original_id)`.
pub fn derive_public_id(salt: &[u8], original_id: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(original_id);
    hasher.finalize().to_vec()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
