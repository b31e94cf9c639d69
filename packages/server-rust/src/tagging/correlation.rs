//! Correlation id extraction and generation.

use http::header::HeaderName;
use http::HeaderMap;
use uuid::Uuid;

/// Length of generated correlation ids (hex characters).
pub const CORRELATION_ID_LEN: usize = 8;

/// Returns the first 8 hex characters of a random UUID v4.
#[must_use]
pub fn generate_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_ID_LEN);
    id
}

/// Reads a caller-supplied correlation id. Missing, blank, or non-UTF-8
/// values count as absent.
#[must_use]
pub fn read_correlation_id(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}
