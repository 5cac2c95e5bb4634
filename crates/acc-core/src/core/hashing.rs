// crates/acc-core/src/core/hashing.rs
// ============================================================================
// Module: ACC Canonical Hashing
// Description: RFC 8785 JSON canonicalization and SHA-256 content hashing.
// Purpose: Provide the byte-exact inputs for results hashes and signatures.
// Dependencies: serde, serde_jcs, sha2, subtle
// ============================================================================

//! ## Overview
//! Every hash that binds an attestation to a decision, and every payload that
//! is signed, goes through RFC 8785 (JCS) canonicalization first. Two values
//! that are equal as JSON therefore always hash to the same digest regardless
//! of key order or whitespace. All hashes on the wire are bare lowercase hex.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Value
// ============================================================================

/// Lowercase hex SHA-256 digest.
///
/// # Invariants
/// - Produced only by hashing; 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Hex(String);

impl Sha256Hex {
    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the value and returns the hex string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Compares against an untrusted hex string in constant time.
    ///
    /// Surrounding whitespace and case are ignored on the untrusted side.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim().to_ascii_lowercase();
        bool::from(self.0.as_bytes().ct_eq(candidate.as_bytes()))
    }
}

impl fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Canonicalizes a value and hashes the resulting bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Sha256Hex, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> Sha256Hex {
    let digest = Sha256::digest(bytes);
    Sha256Hex(hex_encode(&digest))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn sha256_of_empty_input_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn matches_ignores_case_and_whitespace() {
        let hash = sha256_hex(b"acc");
        let upper = format!("  {}\n", hash.as_str().to_ascii_uppercase());
        assert!(hash.matches(&upper));
        assert!(!hash.matches(""));
        assert!(!hash.matches(&hash.as_str()[.. 10]));
    }

    #[test]
    fn canonical_bytes_sort_keys() {
        let value = serde_json::json!({"b": 1, "a": [2, 1]});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(bytes, br#"{"a":[2,1],"b":1}"#.to_vec());
    }
}
