// crates/acc-core/src/core/attestation.rs
// ============================================================================
// Module: ACC Attestation Types
// Description: Attestation document, detached signature envelope, and pointers.
// Purpose: Define the stable v0.1 attestation wire format.
// Dependencies: crate::core::{identifiers, record}, serde
// ============================================================================

//! ## Overview
//! An [`AttestationDocument`] claims that a specific image digest was verified
//! with a specific decision; the decision is pinned by
//! `evidence.verificationResultsHash`. Documents are immutable once written.
//! A [`SignatureEnvelope`] is the optional detached Ed25519 proof over the
//! canonical document bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ImageRef;
use crate::core::record::VerificationStatus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestation document schema version.
pub const ATTESTATION_SCHEMA_VERSION: &str = "v0.1";
/// Tool name embedded in attestation metadata.
pub const TOOL_NAME: &str = "acc";
/// Required top-level attestation fields.
pub const REQUIRED_ATTESTATION_FIELDS: [&str; 4] =
    ["schemaVersion", "timestamp", "subject", "evidence"];
/// Signature algorithm label.
pub const ENVELOPE_ALG: &str = "ed25519";
/// Canonicalization scheme label.
pub const ENVELOPE_CANON: &str = "jcs";

// ============================================================================
// SECTION: Attestation Document
// ============================================================================

/// Attestation subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationSubject {
    /// Image reference.
    pub image_ref: ImageRef,
    /// Normalized digest (empty when unresolved at creation time).
    #[serde(default)]
    pub image_digest: String,
}

/// Evidence backing the attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationEvidence {
    /// SBOM path when one existed on disk.
    #[serde(default)]
    pub sbom_ref: String,
    /// Policy pack location.
    #[serde(default)]
    pub policy_pack: String,
    /// Policy mode label.
    #[serde(default)]
    pub policy_mode: String,
    /// Verification status at attestation time.
    pub verification_status: VerificationStatus,
    /// Canonical results hash of the verification record.
    #[serde(default)]
    pub verification_results_hash: String,
}

/// Producer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationMetadata {
    /// Tool name.
    pub tool: String,
    /// Tool version.
    #[serde(default)]
    pub tool_version: String,
    /// Source commit of the tool build.
    #[serde(default)]
    pub git_commit: String,
}

/// Attestation document (schema `v0.1`).
///
/// # Invariants
/// - Written once; never mutated after persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationDocument {
    /// Schema version.
    pub schema_version: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Attested image.
    pub subject: AttestationSubject,
    /// Verification evidence.
    pub evidence: AttestationEvidence,
    /// Producer metadata.
    pub metadata: AttestationMetadata,
}

// ============================================================================
// SECTION: Signature Envelope
// ============================================================================

/// Detached signature over an attestation document.
///
/// # Invariants
/// - `alg == "ed25519"` and `canon == "jcs"` for every envelope this crate emits.
/// - `key_id` is derived from `public_key`; `payload_hash` from the canonical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    /// Signature algorithm.
    #[serde(default)]
    pub alg: String,
    /// Canonicalization scheme.
    #[serde(default)]
    pub canon: String,
    /// Hex SHA-256 of the raw public key bytes.
    #[serde(default)]
    pub key_id: String,
    /// Base64 raw public key.
    #[serde(default)]
    pub public_key: String,
    /// Hex SHA-256 of the canonical document bytes.
    #[serde(default)]
    pub payload_hash: String,
    /// Base64 Ed25519 signature over the canonical document bytes.
    #[serde(default)]
    pub signature: String,
}

// ============================================================================
// SECTION: Pointers
// ============================================================================

/// Pointer to the most recently written attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAttestationPointer {
    /// Path of the attestation document.
    pub output_path: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Attested image reference.
    pub image_ref: ImageRef,
    /// Attested digest (empty when unresolved).
    pub image_digest: String,
    /// Verification status carried by the attestation.
    pub status: VerificationStatus,
}
