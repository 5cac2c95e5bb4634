// crates/acc-core/src/core/mod.rs
// ============================================================================
// Module: ACC Core Types
// Description: Canonical trust records, attestation types, and reports.
// Purpose: Provide stable, serializable types for the trust subsystem.
// Dependencies: serde, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types define verification records, attestation documents, signature
//! envelopes, and trust status reports. They are the canonical source of truth
//! for every persisted file and every JSON payload the CLI emits.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod attestation;
pub mod hashing;
pub mod identifiers;
pub mod record;
pub mod report;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attestation::ATTESTATION_SCHEMA_VERSION;
pub use attestation::AttestationDocument;
pub use attestation::AttestationEvidence;
pub use attestation::AttestationMetadata;
pub use attestation::AttestationSubject;
pub use attestation::LastAttestationPointer;
pub use attestation::SignatureEnvelope;
pub use hashing::HashError;
pub use hashing::Sha256Hex;
pub use identifiers::DIGEST_PREFIX_LEN;
pub use identifiers::DigestParseError;
pub use identifiers::ImageDigest;
pub use identifiers::ImageRef;
pub use record::PolicyDecision;
pub use record::PolicyMode;
pub use record::RecordError;
pub use record::RecordInput;
pub use record::VerificationRecord;
pub use record::VerificationStatus;
pub use record::Violation;
pub use record::Waiver;
pub use report::EXIT_FAIL;
pub use report::EXIT_PASS;
pub use report::EXIT_UNKNOWN;
pub use report::TRUST_REPORT_SCHEMA_VERSION;
pub use report::TrustStatus;
pub use report::TrustStatusReport;
pub use self::time::TimeError;
pub use self::time::Timestamp;
