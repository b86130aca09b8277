//! Hierarchical hash chain and storage key packing.
//!
//! `hash[1] = SHA256(global_salt || segment[1])` and
//! `hash[k] = SHA256(global_salt || hash[k-1] || segment[k])`.
//!
//! Key wire format, one frame per chain element:
//! `[tag=0x01:1B][len=0x20:1B][digest:32B]`. Frames have a fixed width, so the
//! key of a shorter prefix is always a byte-prefix of the key of a longer one.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{MapperError, Result};

/// Length in bytes of one chain element.
pub const DIGEST_LENGTH: usize = 32;

/// Frame tag for a SHA-256 chain element.
pub const DIGEST_TAG: u8 = 0x01;

/// Encoded size of one chain element: tag, length, digest.
pub const FRAME_LENGTH: usize = 2 + DIGEST_LENGTH;

pub type ChainDigest = [u8; DIGEST_LENGTH];

// ============================================================================
// HierarchicalHasher
// ============================================================================

/// Derives hash chains salted with the instance-wide secret.
///
/// The secret is wiped from memory when the hasher is dropped.
pub struct HierarchicalHasher {
    global_salt: Zeroizing<Vec<u8>>,
}

impl HierarchicalHasher {
    pub fn new(global_salt: &[u8]) -> Self {
        Self {
            global_salt: Zeroizing::new(global_salt.to_vec()),
        }
    }

    /// Chain over every segment, one digest per prefix length.
    pub fn chain<T: AsRef<[u8]>>(&self, segments: &[T]) -> HashChain {
        let mut digests = Vec::with_capacity(segments.len());
        let mut previous: Option<ChainDigest> = None;
        for segment in segments {
            let mut hasher = Sha256::new();
            hasher.update(self.global_salt.as_slice());
            if let Some(prev) = previous {
                hasher.update(prev);
            }
            hasher.update(segment.as_ref());
            let digest: ChainDigest = hasher.finalize().into();
            digests.push(digest);
            previous = Some(digest);
        }
        HashChain { digests }
    }
}

// ============================================================================
// HashChain
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChain {
    digests: Vec<ChainDigest>,
}

impl HashChain {
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn digests(&self) -> &[ChainDigest] {
        &self.digests
    }

    /// Storage key for the first `depth` elements of the chain.
    ///
    /// `depth` is clamped to the chain length.
    pub fn key_at(&self, depth: usize) -> Vec<u8> {
        pack(&self.digests[..depth.min(self.digests.len())])
    }

    /// Storage key for the full chain.
    pub fn leaf_key(&self) -> Vec<u8> {
        pack(&self.digests)
    }

    /// Keys for prefix lengths `1..=len`, shortest first.
    pub fn prefix_keys(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        (1..=self.digests.len()).map(move |depth| self.key_at(depth))
    }
}

// ============================================================================
// Packing
// ============================================================================

/// Pack chain elements into a storage key.
pub fn pack(digests: &[ChainDigest]) -> Vec<u8> {
    let mut key = Vec::with_capacity(digests.len() * FRAME_LENGTH);
    for digest in digests {
        key.push(DIGEST_TAG);
        key.push(DIGEST_LENGTH as u8);
        key.extend_from_slice(digest);
    }
    key
}

/// Inverse of [`pack`]. Rejects unknown tags, unexpected lengths and truncated frames.
pub fn unpack(key: &[u8]) -> Result<Vec<ChainDigest>> {
    let mut digests = Vec::with_capacity(key.len() / FRAME_LENGTH);
    let mut rest = key;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(MapperError::Encoding(format!(
                "truncated key frame header at offset {}",
                key.len() - rest.len()
            )));
        }
        let (tag, len) = (rest[0], rest[1] as usize);
        if tag != DIGEST_TAG {
            return Err(MapperError::Encoding(format!("unknown key frame tag {tag:#04x}")));
        }
        if len != DIGEST_LENGTH {
            return Err(MapperError::Encoding(format!(
                "key frame length {len}, expected {DIGEST_LENGTH}"
            )));
        }
        let body = &rest[2..];
        if body.len() < len {
            return Err(MapperError::Encoding("truncated key frame body".to_string()));
        }
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(&body[..len]);
        digests.push(digest);
        rest = &body[len..];
    }
    Ok(digests)
}
