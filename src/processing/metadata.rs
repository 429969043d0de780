//! Identifiers and timestamps attached to each run.

use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Deterministic SHA-256 of the source text, hex encoded.
pub fn compute_source_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current UTC time formatted as RFC 3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Fresh identifier for one pipeline run.
pub(crate) fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}
