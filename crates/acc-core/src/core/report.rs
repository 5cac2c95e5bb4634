// crates/acc-core/src/core/report.rs
// ============================================================================
// Module: ACC Trust Status Report
// Description: Versioned read-side aggregate and exit-code contract.
// Purpose: Render trust decisions with a fixed, null-free JSON schema.
// Dependencies: crate::core::record, serde
// ============================================================================

//! ## Overview
//! [`TrustStatusReport`] is computed fresh on every query and never persisted.
//! Every field is always present: absent data becomes `[]`, `false`, or `""`.
//! [`TrustStatus::exit_code`] is the single mapping from trust outcome to the
//! process exit code shared by every command.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ImageRef;
use crate::core::record::VerificationStatus;
use crate::core::record::Violation;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Trust status report schema version.
pub const TRUST_REPORT_SCHEMA_VERSION: &str = "v0.2";

/// Exit code for pass / verified.
pub const EXIT_PASS: u8 = 0;
/// Exit code for fail / unverified / blocked.
pub const EXIT_FAIL: u8 = 1;
/// Exit code for unknown / cannot complete.
pub const EXIT_UNKNOWN: u8 = 2;

// ============================================================================
// SECTION: Trust Status
// ============================================================================

/// Trust status of an image as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    /// Verified and allowed.
    Pass,
    /// Verified and denied.
    Fail,
    /// Verified and denied in warn mode.
    Warn,
    /// No verification history.
    Unknown,
}

impl TrustStatus {
    /// Returns the process exit code for this status.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Pass => EXIT_PASS,
            Self::Fail | Self::Warn => EXIT_FAIL,
            Self::Unknown => EXIT_UNKNOWN,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
            Self::Unknown => "unknown",
        }
    }
}

impl From<VerificationStatus> for TrustStatus {
    fn from(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::Pass => Self::Pass,
            VerificationStatus::Fail => Self::Fail,
            VerificationStatus::Warn => Self::Warn,
        }
    }
}

impl fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Read-side trust aggregate for one image (schema `v0.2`).
///
/// # Invariants
/// - Array fields are always present and never null.
/// - `attestations` only lists paths under the image's own digest directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustStatusReport {
    /// Report schema version.
    pub schema_version: String,
    /// Queried image reference.
    pub image_ref: ImageRef,
    /// Trust status.
    pub status: TrustStatus,
    /// Verification profile name, if one was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_used: Option<String>,
    /// Policy violations from the record.
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Policy warnings from the record.
    #[serde(default)]
    pub warnings: Vec<Violation>,
    /// Whether an SBOM was present during verification.
    #[serde(default)]
    pub sbom_present: bool,
    /// Attestation document paths for this digest.
    #[serde(default)]
    pub attestations: Vec<String>,
    /// RFC 3339 verification time, empty when unknown.
    #[serde(default)]
    pub timestamp: String,
}

impl TrustStatusReport {
    /// Builds the report for an image with no verification history.
    #[must_use]
    pub fn unknown(image_ref: ImageRef) -> Self {
        Self {
            schema_version: TRUST_REPORT_SCHEMA_VERSION.to_string(),
            image_ref,
            status: TrustStatus::Unknown,
            profile_used: None,
            violations: Vec::new(),
            warnings: Vec::new(),
            sbom_present: false,
            attestations: Vec::new(),
            timestamp: String::new(),
        }
    }

    /// Returns the process exit code for this report.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}
