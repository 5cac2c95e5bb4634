// crates/acc-core/src/runtime/results_hash.rs
// ============================================================================
// Module: ACC Results Hash
// Description: Order-independent canonical hash of a verification decision.
// Purpose: Bind attestations to the exact decision they certify.
// Dependencies: crate::core::{hashing, record}, serde
// ============================================================================

//! ## Overview
//! The results hash is SHA-256 over the JCS bytes of a canonical projection
//! of a [`VerificationRecord`]: status, sorted violations, sorted waivers,
//! SBOM presence, and the attestation count when present. Violations sort by
//! rule, then severity, then the remaining fields; waivers sort by rule id,
//! then the remaining fields. Any permutation of the input arrays therefore
//! hashes identically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::hashing::HashError;
use crate::core::hashing::Sha256Hex;
use crate::core::hashing::hash_canonical_json;
use crate::core::record::VerificationRecord;
use crate::core::record::VerificationStatus;
use crate::core::record::Violation;
use crate::core::record::Waiver;

// ============================================================================
// SECTION: Canonical Projection
// ============================================================================

/// Hash input derived from a record.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalResults<'a> {
    /// Record status.
    status: VerificationStatus,
    /// Violations in canonical order.
    violations: Vec<&'a Violation>,
    /// Waivers in canonical order.
    waivers: Vec<&'a Waiver>,
    /// SBOM presence.
    sbom_present: bool,
    /// Attestation count, when the record carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    attestations: Option<u32>,
}

// ============================================================================
// SECTION: Hasher
// ============================================================================

/// Computes verification results hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalHasher;

impl CanonicalHasher {
    /// Returns the canonical results hash for `record`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn hash(record: &VerificationRecord) -> Result<Sha256Hex, HashError> {
        let mut violations: Vec<&Violation> = record.policy_decision.violations.iter().collect();
        violations.sort();
        let mut waivers: Vec<&Waiver> = record.waivers.iter().collect();
        waivers.sort();
        hash_canonical_json(&CanonicalResults {
            status: record.status,
            violations,
            waivers,
            sbom_present: record.sbom_present,
            attestations: record.attestation_count,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;
    use crate::core::identifiers::ImageRef;
    use crate::core::record::PolicyDecision;

    fn violation(rule: &str, severity: &str) -> Violation {
        Violation {
            rule: rule.to_string(),
            severity: severity.to_string(),
            message: format!("{rule} broke"),
            resource: None,
        }
    }

    fn record(violations: Vec<Violation>) -> VerificationRecord {
        VerificationRecord {
            image_digest: String::new(),
            image_ref: ImageRef::new("app:1"),
            status: VerificationStatus::Fail,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            policy_decision: PolicyDecision {
                allow: false,
                violations,
                warnings: Vec::new(),
            },
            sbom_present: true,
            profile_used: None,
            waivers: Vec::new(),
            attestation_count: None,
        }
    }

    #[test]
    fn timestamp_and_ref_do_not_affect_hash() {
        let base = record(vec![violation("a", "high")]);
        let mut other = base.clone();
        other.timestamp = "2030-01-01T00:00:00Z".to_string();
        other.image_ref = ImageRef::new("app:2");
        assert_eq!(CanonicalHasher::hash(&base).unwrap(), CanonicalHasher::hash(&other).unwrap());
    }

    #[test]
    fn status_and_sbom_change_hash() {
        let base = record(Vec::new());
        let mut no_sbom = base.clone();
        no_sbom.sbom_present = false;
        assert_ne!(CanonicalHasher::hash(&base).unwrap(), CanonicalHasher::hash(&no_sbom).unwrap());
        let mut counted = base.clone();
        counted.attestation_count = Some(1);
        assert_ne!(CanonicalHasher::hash(&base).unwrap(), CanonicalHasher::hash(&counted).unwrap());
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        let hash = CanonicalHasher::hash(&record(Vec::new())).unwrap();
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|ch| matches!(ch, '0' ..= '9' | 'a' ..= 'f')));
    }
}
