//! Content hashing utilities for cache keys and schema fingerprints.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic output.
/// Returns a 64-character lowercase hexadecimal string.
///
/// # Errors
/// Returns an error if the value cannot be serialized to JSON.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(hash_text(&json))
}

/// SHA256 of raw text, as lowercase hex. Used to key prompts exactly.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
