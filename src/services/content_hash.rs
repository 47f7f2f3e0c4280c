//! Content addressing for preset files.
//!
//! A preset's identity is the SHA-256 of its `parameters` object serialized
//! canonically (keys sorted, no whitespace). Cosmetic fields outside
//! `parameters` and key order do not change the digest.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Hex digest of a preset's `parameters` object.
pub fn preset_digest(bytes: &[u8]) -> Result<String, String> {
    let document: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| format!("not valid JSON: {}", e))?;

    let parameters = document
        .get("parameters")
        .filter(|value| value.is_object())
        .ok_or_else(|| "missing 'parameters' object".to_string())?;

    // serde_json maps are ordered by key, so this encoding is canonical
    let canonical = serde_json::to_vec(parameters)
        .map_err(|e| format!("could not encode parameters: {}", e))?;

    Ok(hex::encode(Sha256::digest(&canonical)))
}
