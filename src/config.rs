//! Construction-time options for [`GdprMapper`](crate::mapper::GdprMapper).

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use crate::error::{MapperError, Result};

/// Default record lifetime when none is configured: one year.
pub const DEFAULT_LIVE_TTL: Duration = Duration::from_secs(8760 * 60 * 60);

/// Random bytes drawn for a generated global salt.
const GENERATED_SALT_LENGTH: usize = 16;

/// Options consumed once when building a mapper.
#[derive(Clone, Default)]
pub struct MapperOptions {
    /// Instance-wide secret folded into every chain hash.
    /// When `None`, a random one is generated and must be persisted by the operator.
    pub global_salt: Option<Vec<u8>>,
    /// Lifetime given to records that are created or refreshed without an override.
    /// Defaults to [`DEFAULT_LIVE_TTL`].
    pub default_ttl: Option<Duration>,
}

impl MapperOptions {
    pub fn with_global_salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.global_salt = Some(salt.into());
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl.unwrap_or(DEFAULT_LIVE_TTL)
    }

    /// The configured salt, or a freshly generated one.
    pub(crate) fn resolve_global_salt(&self) -> Result<Vec<u8>> {
        if let Some(salt) = &self.global_salt {
            return Ok(salt.clone());
        }
        let generated = generate_global_salt()?;
        tracing::warn!(
            default_salt = %generated,
            "no global salt provided; using a random salt that must be supplied on next startup"
        );
        Ok(generated.into_bytes())
    }
}

// Keep the salt itself out of debug output.
impl std::fmt::Debug for MapperOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperOptions")
            .field("global_salt", &self.global_salt.as_ref().map(|_| "<redacted>"))
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Random base64url text suitable for passing back in as a global salt.
pub fn generate_global_salt() -> Result<String> {
    let mut bytes = [0u8; GENERATED_SALT_LENGTH];
    getrandom::getrandom(&mut bytes).map_err(|e| MapperError::Randomness(e.to_string()))?;
    Ok(URL_SAFE.encode(bytes))
}

/// Parse a TTL such as `"90s"`, `"15m"` or `"8760h"`.
pub fn parse_ttl(s: &str) -> Result<Duration> {
    humantime::parse_duration(s.trim()).map_err(|e| MapperError::InvalidTtl(format!("{s:?}: {e}")))
}
