//! Request surface: path parsing and JSON envelopes for query, bulk query and clear.
//!
//! Transport-agnostic. An HTTP layer maps routes onto these functions and
//! writes the envelopes out unchanged.

use std::io::{BufRead, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::mapper::GdprMapper;
use crate::record::PublicResultRecord;
use crate::storage::traits::KvStore;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Fail,
}

/// `{status, msg?, payload?, removed?}`: the only shape returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PublicResultRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl ApiEnvelope {
    pub fn ok(payload: PublicResultRecord) -> Self {
        Self {
            status: Status::Ok,
            msg: None,
            payload: Some(payload),
            removed: None,
        }
    }

    pub fn fail(err: impl std::fmt::Display) -> Self {
        Self {
            status: Status::Fail,
            msg: Some(err.to_string()),
            payload: None,
            removed: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Split a `/`-separated path into segments, dropping empty parts.
pub fn parse_path(path: &str) -> Vec<Vec<u8>> {
    split_segments(path.as_bytes())
}

/// Byte-level form of [`parse_path`]; segments need not be UTF-8.
pub fn split_segments(path: &[u8]) -> Vec<Vec<u8>> {
    path.split(|&b| b == b'/')
        .filter(|part| !part.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

/// TTL override from a request parameter. Unparsable values fall back to the default TTL.
pub fn ttl_override(raw: Option<&str>) -> Option<Duration> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    match config::parse_ttl(raw) {
        Ok(ttl) => Some(ttl),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring ttl override");
            None
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Query one path and wrap the leaf's public record.
pub fn query_path<S: KvStore>(
    mapper: &GdprMapper<S>,
    path: &str,
    ttl: Option<Duration>,
) -> ApiEnvelope {
    query_segments(mapper, &parse_path(path), ttl)
}

fn query_segments<S: KvStore>(
    mapper: &GdprMapper<S>,
    segments: &[Vec<u8>],
    ttl: Option<Duration>,
) -> ApiEnvelope {
    match mapper.query(segments, ttl) {
        Ok(record) => ApiEnvelope::ok(record.public_version()),
        Err(e) => ApiEnvelope::fail(e),
    }
}

/// Query one path per input line and write one envelope per output line, in order.
///
/// Lines are split on raw bytes, so a segment that is not UTF-8 is queried
/// like any other. Per-line failures become fail envelopes; only I/O errors
/// abort. Returns the number of lines answered.
pub fn bulk_query<S, R, W>(
    mapper: &GdprMapper<S>,
    reader: R,
    mut writer: W,
    ttl: Option<Duration>,
) -> std::io::Result<usize>
where
    S: KvStore,
    R: BufRead,
    W: Write,
{
    let mut answered = 0;
    for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let envelope = query_segments(mapper, &split_segments(&line), ttl);
        serde_json::to_writer(&mut writer, &envelope)?;
        writer.write_all(b"\n")?;
        answered += 1;
    }
    writer.flush()?;
    Ok(answered)
}

/// Erase a path and everything below it.
pub fn clear_path<S: KvStore>(mapper: &GdprMapper<S>, path: &str) -> ApiEnvelope {
    match mapper.clear_prefix(&parse_path(path)) {
        Ok(removed) => ApiEnvelope {
            status: Status::Ok,
            msg: Some(format!(
                "Removed all({removed}) records starting with {path}"
            )),
            payload: None,
            removed: Some(removed),
        },
        Err(e) => ApiEnvelope::fail(e),
    }
}
