//! API key generation and hashing
//!
//! Keys are handed to the principal exactly once. Only the SHA-256 digest
//! is ever persisted.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a fresh API key
pub fn generate_api_key() -> String {
    Uuid::new_v4().to_string()
}

/// Hex-encoded SHA-256 digest of an API key
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a presented API key.
///
/// Strips surrounding whitespace, zero-width characters, and anything
/// outside ISO-8859-1, which is what survives an HTTP header anyway.
/// Returns `None` when nothing is left.
pub fn sanitize_api_key(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .filter(|c| (*c as u32) <= 0xFF)
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
