//! Range-aware cache key generation.

use sha2::{Digest, Sha256};

use crate::query::{DATE_FORMAT, DateRange};

/// Namespace prefix shared by every emissions cache key.
pub const KEY_PREFIX: &str = "emissions:";

/// Compute the cache key for one facility's total over a date range.
///
/// Both dates render as fixed-width `YYYY-MM-DD`, so the newline-separated
/// preimage is unambiguous even when a facility name contains newlines.
pub fn compute_cache_key(range: &DateRange, facility: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(range.start.format(DATE_FORMAT).to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(range.end.format(DATE_FORMAT).to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(facility.as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Whether a key has the emissions prefix followed by a SHA-256 hex digest.
pub fn is_cache_key(key: &str) -> bool {
    key.strip_prefix(KEY_PREFIX)
        .is_some_and(|digest| digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
}
