// crates/acc-core/src/runtime/envelope.rs
// ============================================================================
// Module: ACC Signature Envelope
// Description: Detached Ed25519 signatures over JCS-canonical payloads.
// Purpose: Prove authorship of attestation documents and detect tampering.
// Dependencies: crate::core::{attestation, hashing}, base64, ed25519-dalek
// ============================================================================

//! ## Overview
//! Signing canonicalizes the payload with JCS, hashes the canonical bytes
//! into `payloadHash`, and signs the canonical bytes themselves. The key id
//! is the SHA-256 hex of the raw public key.
//!
//! Verification is all-or-nothing: algorithm and canonicalization labels,
//! required fields, key id binding, payload hash, and the signature itself
//! must all check out. It is the only module in the crate that touches raw
//! cryptography.
//!
//! Payloads are generic over [`Serialize`] so verifiers can check the exact
//! JSON read from disk rather than a typed re-encoding of it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use serde::Serialize;
use thiserror::Error;

use crate::core::attestation::ENVELOPE_ALG;
use crate::core::attestation::ENVELOPE_CANON;
use crate::core::attestation::SignatureEnvelope;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::sha256_hex;
use crate::runtime::layout::read_limited;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Raw Ed25519 key length in bytes.
const KEY_LEN: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope signing and verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The envelope names an algorithm other than Ed25519.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The envelope names a canonicalization other than JCS.
    #[error("unsupported canonicalization: {0}")]
    UnsupportedCanonicalization(String),
    /// A required envelope field is empty.
    #[error("signature envelope missing {0}")]
    MissingField(&'static str),
    /// Key material could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The declared key id does not match the embedded public key.
    #[error("key id does not match public key")]
    KeyIdMismatch,
    /// The signing key is not in the trusted set.
    #[error("signing key {0} is not trusted")]
    UntrustedKey(String),
    /// The payload no longer hashes to the signed value.
    #[error("payload hash mismatch")]
    PayloadHashMismatch,
    /// The signature failed to decode or verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Returns the key id for a public key.
#[must_use]
pub fn key_id(key: &VerifyingKey) -> String {
    sha256_hex(key.as_bytes()).into_string()
}

/// Signs the canonical form of `payload`.
///
/// # Errors
///
/// Returns [`EnvelopeError::Hash`] when the payload cannot be canonicalized.
pub fn sign<T: Serialize + ?Sized>(
    payload: &T,
    key: &SigningKey,
) -> Result<SignatureEnvelope, EnvelopeError> {
    let canonical = canonical_json_bytes(payload)?;
    let signature = key.sign(&canonical);
    let public = key.verifying_key();
    Ok(SignatureEnvelope {
        alg: ENVELOPE_ALG.to_string(),
        canon: ENVELOPE_CANON.to_string(),
        key_id: key_id(&public),
        public_key: Base64.encode(public.as_bytes()),
        payload_hash: sha256_hex(&canonical).into_string(),
        signature: Base64.encode(signature.to_bytes()),
    })
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Returns true when `envelope` is a valid signature over `payload`.
#[must_use]
pub fn verify<T: Serialize + ?Sized>(payload: &T, envelope: &SignatureEnvelope) -> bool {
    check(payload, envelope).is_ok()
}

/// Verifies `envelope` over `payload`, reporting the first failed check.
///
/// # Errors
///
/// Returns [`EnvelopeError`] naming the failed check.
pub fn check<T: Serialize + ?Sized>(
    payload: &T,
    envelope: &SignatureEnvelope,
) -> Result<(), EnvelopeError> {
    if envelope.alg != ENVELOPE_ALG {
        return Err(EnvelopeError::UnsupportedAlgorithm(envelope.alg.clone()));
    }
    if envelope.canon != ENVELOPE_CANON {
        return Err(EnvelopeError::UnsupportedCanonicalization(envelope.canon.clone()));
    }
    for (name, value) in [
        ("keyId", &envelope.key_id),
        ("publicKey", &envelope.public_key),
        ("payloadHash", &envelope.payload_hash),
        ("signature", &envelope.signature),
    ] {
        if value.trim().is_empty() {
            return Err(EnvelopeError::MissingField(name));
        }
    }
    let public_bytes = Base64
        .decode(envelope.public_key.trim())
        .map_err(|err| EnvelopeError::InvalidKey(err.to_string()))?;
    let public = verifying_key_from(&public_bytes)?;
    if !sha256_hex(public.as_bytes()).matches(&envelope.key_id) {
        return Err(EnvelopeError::KeyIdMismatch);
    }
    let canonical = canonical_json_bytes(payload)?;
    if !sha256_hex(&canonical).matches(&envelope.payload_hash) {
        return Err(EnvelopeError::PayloadHashMismatch);
    }
    let signature_bytes = Base64
        .decode(envelope.signature.trim())
        .map_err(|err| EnvelopeError::SignatureInvalid(err.to_string()))?;
    let signature = Signature::try_from(signature_bytes.as_slice())
        .map_err(|err| EnvelopeError::SignatureInvalid(err.to_string()))?;
    public
        .verify_strict(&canonical, &signature)
        .map_err(|err| EnvelopeError::SignatureInvalid(err.to_string()))
}

/// Verifies `envelope` and requires its key id to be in `trusted_keys`.
///
/// An empty trusted set accepts any key that verifies.
///
/// # Errors
///
/// Returns [`EnvelopeError`] naming the failed check.
pub fn check_trusted<T: Serialize + ?Sized>(
    payload: &T,
    envelope: &SignatureEnvelope,
    trusted_keys: &[String],
) -> Result<(), EnvelopeError> {
    check(payload, envelope)?;
    if trusted_keys.is_empty() {
        return Ok(());
    }
    let declared = envelope.key_id.trim().to_ascii_lowercase();
    if trusted_keys.iter().any(|trusted| trusted.trim().eq_ignore_ascii_case(&declared)) {
        Ok(())
    } else {
        Err(EnvelopeError::UntrustedKey(declared))
    }
}

// ============================================================================
// SECTION: Key Loading
// ============================================================================

/// Loads an Ed25519 signing key stored as raw bytes or base64.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKey`] when the file is unreadable or malformed.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, EnvelopeError> {
    let bytes = read_key_bytes(path)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Loads an Ed25519 public key stored as raw bytes or base64.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKey`] when the file is unreadable or malformed.
pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey, EnvelopeError> {
    let bytes = read_key_bytes(path)?;
    verifying_key_from(&bytes)
}

/// Reads 32 key bytes from a raw or base64 key file.
fn read_key_bytes(path: &Path) -> Result<[u8; KEY_LEN], EnvelopeError> {
    let bytes = read_limited(path)
        .map_err(|err| EnvelopeError::InvalidKey(format!("{}: {err}", path.display())))?;
    let decoded = if bytes.len() == KEY_LEN {
        bytes
    } else {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| EnvelopeError::InvalidKey("key must be raw bytes or base64".to_string()))?;
        Base64.decode(text.trim()).map_err(|err| EnvelopeError::InvalidKey(err.to_string()))?
    };
    decoded
        .as_slice()
        .try_into()
        .map_err(|_| EnvelopeError::InvalidKey(format!("expected {KEY_LEN} key bytes")))
}

/// Builds a verifying key from raw bytes.
fn verifying_key_from(bytes: &[u8]) -> Result<VerifyingKey, EnvelopeError> {
    let key: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| EnvelopeError::InvalidKey(format!("expected {KEY_LEN} key bytes")))?;
    VerifyingKey::from_bytes(&key).map_err(|err| EnvelopeError::InvalidKey(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::fs;

    use serde_json::json;

    use super::*;

    #[test]
    fn keys_load_from_raw_and_base64_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let raw = dir.path().join("raw.key");
        let encoded = dir.path().join("b64.key");
        fs::write(&raw, key.to_bytes()).unwrap();
        fs::write(&encoded, format!("{}\n", Base64.encode(key.to_bytes()))).unwrap();
        assert_eq!(load_signing_key(&raw).unwrap().to_bytes(), key.to_bytes());
        assert_eq!(load_signing_key(&encoded).unwrap().to_bytes(), key.to_bytes());
        let public = dir.path().join("key.pub");
        fs::write(&public, Base64.encode(key.verifying_key().as_bytes())).unwrap();
        assert_eq!(load_verifying_key(&public).unwrap(), key.verifying_key());
    }

    #[test]
    fn short_key_file_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("short.key");
        fs::write(&path, Base64.encode([1u8; 16])).unwrap();
        assert!(matches!(load_signing_key(&path), Err(EnvelopeError::InvalidKey(_))));
    }

    #[test]
    fn labels_are_checked_before_cryptography() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let payload = json!({"a": 1});
        let mut envelope = sign(&payload, &key).unwrap();
        envelope.alg = "rsa".to_string();
        assert_eq!(check(&payload, &envelope), Err(EnvelopeError::UnsupportedAlgorithm("rsa".to_string())));
    }

    #[test]
    fn trusted_keys_restrict_signers() {
        let key = SigningKey::from_bytes(&[4u8; 32]);
        let payload = json!({"b": [1, 2]});
        let envelope = sign(&payload, &key).unwrap();
        assert!(check_trusted(&payload, &envelope, &[]).is_ok());
        assert!(check_trusted(&payload, &envelope, &[envelope.key_id.to_uppercase()]).is_ok());
        assert!(matches!(
            check_trusted(&payload, &envelope, &["00".repeat(32)]),
            Err(EnvelopeError::UntrustedKey(_))
        ));
    }
}
