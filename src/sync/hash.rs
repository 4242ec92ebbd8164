//! Content fingerprinting for reconciliation.
//!
//! Every comparison the engine makes goes through [`fingerprint`], on both the
//! remote and the local side, so the normalization applied here must stay
//! identical for both: trailing whitespace is trimmed, nothing else.

use sha2::{Digest, Sha256};

/// Compute the SHA256 fingerprint of a query body.
///
/// Trailing whitespace (including trailing newlines) is stripped before
/// hashing. Internal whitespace, case, and line endings are significant.
///
/// # Example
///
/// ```
/// use qsync::sync::fingerprint;
///
/// assert_eq!(fingerprint("SELECT 1"), fingerprint("SELECT 1\n\n"));
/// assert_ne!(fingerprint("SELECT 1"), fingerprint("select 1"));
/// ```
#[must_use]
pub fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.trim_end().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check if a body differs from the one recorded at last sync.
///
/// Returns `true` if there is no stored fingerprint or it differs.
#[must_use]
pub fn has_changed(current: &str, stored: Option<&str>) -> bool {
    stored.map_or(true, |h| h != current)
}
