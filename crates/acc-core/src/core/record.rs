// crates/acc-core/src/core/record.rs
// ============================================================================
// Module: ACC Verification Records
// Description: Typed verification outcome and embedded policy decision.
// Purpose: Hold the single authoritative pass/fail decision for one image.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`VerificationRecord`] is written once per verification run and keyed by
//! image digest. Its human-facing `status` and its machine `policyDecision`
//! must never disagree: `pass` if and only if `allow == true`. Records are
//! built through [`VerificationRecord::from_decision`], which derives the
//! status, and checked with [`VerificationRecord::check_consistency`] on every
//! save and load.
//!
//! Decoding is defensive: every collection and flag defaults to empty/false
//! when absent so a sparse decision document never panics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;

// ============================================================================
// SECTION: Status and Mode
// ============================================================================

/// Outcome of one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Policy allowed the image.
    Pass,
    /// Policy denied the image in enforce mode.
    Fail,
    /// Policy denied the image but the pack runs in warn mode.
    Warn,
}

impl VerificationStatus {
    /// Derives the status from a policy decision and the active mode.
    #[must_use]
    pub const fn derive(allow: bool, mode: PolicyMode) -> Self {
        match (allow, mode) {
            (true, _) => Self::Pass,
            (false, PolicyMode::Enforce) => Self::Fail,
            (false, PolicyMode::Warn) => Self::Warn,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy evaluation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Denials block.
    #[default]
    Enforce,
    /// Denials are reported but do not block.
    Warn,
}

impl PolicyMode {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Warn => "warn",
        }
    }
}

// ============================================================================
// SECTION: Policy Decision
// ============================================================================

/// Single policy rule finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Violation {
    /// Rule identifier.
    pub rule: String,
    /// Severity label (`critical`, `high`, ...).
    pub severity: String,
    /// Human-readable message.
    pub message: String,
    /// Resource the finding applies to, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

/// Operator-approved exception for a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Waiver {
    /// Waived rule identifier.
    pub rule_id: String,
    /// Justification recorded with the waiver.
    pub justification: String,
    /// Optional RFC 3339 expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Decision returned by the external policy engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDecision {
    /// Whether policy allowed the image.
    pub allow: bool,
    /// Blocking findings.
    pub violations: Vec<Violation>,
    /// Non-blocking findings.
    pub warnings: Vec<Violation>,
}

// ============================================================================
// SECTION: Verification Record
// ============================================================================

/// Outcome of one verification run for one image.
///
/// # Invariants
/// - `status == Pass` iff `policy_decision.allow`.
/// - Never mutated in place; a new verification supersedes the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Normalized digest of the verified image, empty when unresolved.
    #[serde(default)]
    pub image_digest: String,
    /// Image reference as verified.
    pub image_ref: ImageRef,
    /// Human-facing status.
    pub status: VerificationStatus,
    /// RFC 3339 verification time.
    #[serde(default)]
    pub timestamp: String,
    /// Embedded policy decision.
    #[serde(default)]
    pub policy_decision: PolicyDecision,
    /// Whether an SBOM was present during verification.
    #[serde(default)]
    pub sbom_present: bool,
    /// Verification profile name, if one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_used: Option<String>,
    /// Waivers applied during verification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waivers: Vec<Waiver>,
    /// Number of attestations consulted during verification, if tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_count: Option<u32>,
}

/// Inputs used to build a record from a policy decision.
#[derive(Debug, Clone)]
pub struct RecordInput {
    /// Image reference being verified.
    pub image_ref: ImageRef,
    /// Resolved digest, when available.
    pub image_digest: Option<ImageDigest>,
    /// Policy engine decision.
    pub decision: PolicyDecision,
    /// Active policy mode.
    pub mode: PolicyMode,
    /// Whether an SBOM was present.
    pub sbom_present: bool,
    /// Verification profile name.
    pub profile_used: Option<String>,
    /// Waivers applied.
    pub waivers: Vec<Waiver>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl VerificationRecord {
    /// Builds a record whose status is derived from the decision.
    #[must_use]
    pub fn from_decision(input: RecordInput) -> Self {
        let status = VerificationStatus::derive(input.decision.allow, input.mode);
        Self {
            image_digest: input
                .image_digest
                .map(|digest| digest.as_str().to_string())
                .unwrap_or_default(),
            image_ref: input.image_ref,
            status,
            timestamp: input.timestamp,
            policy_decision: input.decision,
            sbom_present: input.sbom_present,
            profile_used: input.profile_used,
            waivers: input.waivers,
            attestation_count: None,
        }
    }

    /// Returns the parsed digest when the record carries a valid one.
    #[must_use]
    pub fn digest(&self) -> Option<ImageDigest> {
        ImageDigest::parse(&self.image_digest).ok()
    }

    /// Checks the status against the embedded decision.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Inconsistent`] when status and decision disagree.
    pub const fn check_consistency(&self) -> Result<(), RecordError> {
        let consistent = match self.status {
            VerificationStatus::Pass => self.policy_decision.allow,
            VerificationStatus::Fail | VerificationStatus::Warn => !self.policy_decision.allow,
        };
        if consistent {
            Ok(())
        } else {
            Err(RecordError::Inconsistent {
                status: self.status,
                allow: self.policy_decision.allow,
            })
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Record invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Status and policy decision disagree.
    #[error("record status {status} contradicts policy decision allow={allow}")]
    Inconsistent {
        /// Recorded status.
        status: VerificationStatus,
        /// Recorded allow flag.
        allow: bool,
    },
}
