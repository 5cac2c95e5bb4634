// crates/acc-core/src/runtime/status.rs
// ============================================================================
// Module: ACC Trust Status Aggregator
// Description: Read-side merge of verification state and attestations.
// Purpose: Render stable trust reports with deterministic exit codes.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! [`TrustStatusAggregator::status`] never fails: a missing or unusable
//! record is the representable `unknown` state. Attestation paths come only
//! from the queried image's own digest directory and must name the full
//! digest as their subject; an unresolved digest yields an empty list rather
//! than a wider search.
//!
//! [`TrustStatusAggregator::verify`] goes further and validates each
//! attestation against the record's current results hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::core::record::VerificationRecord;
use crate::core::report::TRUST_REPORT_SCHEMA_VERSION;
use crate::core::report::TrustStatus;
use crate::core::report::TrustStatusReport;
use crate::interfaces::RegistryClient;
use crate::interfaces::RemoteTarget;
use crate::runtime::attestations::AttestationStore;
use crate::runtime::attestations::AttestationValidation;
use crate::runtime::results_hash::CanonicalHasher;
use crate::runtime::state::StateLookup;
use crate::runtime::state::VerificationStateStore;

// ============================================================================
// SECTION: Remote Source
// ============================================================================

/// Registry consulted before listing attestations.
#[derive(Clone, Copy)]
pub struct RemoteSource<'a> {
    /// Registry transport.
    pub client: &'a dyn RegistryClient,
    /// Repository holding attestation artifacts.
    pub target: &'a RemoteTarget,
}

impl RemoteSource<'_> {
    /// Fetches remote attestations for `digest`, ignoring failures.
    pub(crate) fn sync(&self, store: &AttestationStore<'_>, digest: &ImageDigest) {
        // Failures are audited by the store and degrade to local-only results.
        let _ = store.sync_remote(self.client, self.target, digest);
    }
}

// ============================================================================
// SECTION: Verify Report
// ============================================================================

/// Result of validating every attestation for an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustVerifyReport {
    /// Report schema version.
    pub schema_version: String,
    /// Queried image reference.
    pub image_ref: ImageRef,
    /// `pass` when at least one attestation is fully valid, `fail` when none
    /// is, `unknown` without verification state.
    pub status: TrustStatus,
    /// Resolved digest, empty when unresolved.
    pub image_digest: String,
    /// Results hash of the current record, empty when unknown.
    pub expected_results_hash: String,
    /// Per-attestation outcomes.
    pub attestations: Vec<AttestationValidation>,
}

impl TrustVerifyReport {
    /// Returns the process exit code for this report.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}

// ============================================================================
// SECTION: Aggregator
// ============================================================================

/// Builds trust reports for one image at a time.
pub struct TrustStatusAggregator<'a> {
    /// Verification state.
    state: &'a VerificationStateStore<'a>,
    /// Attestation discovery.
    attestations: &'a AttestationStore<'a>,
    /// Optional remote attestation source.
    remote: Option<RemoteSource<'a>>,
}

impl<'a> TrustStatusAggregator<'a> {
    /// Creates an aggregator over local state.
    #[must_use]
    pub const fn new(
        state: &'a VerificationStateStore<'a>,
        attestations: &'a AttestationStore<'a>,
    ) -> Self {
        Self {
            state,
            attestations,
            remote: None,
        }
    }

    /// Fetches remote attestations before each listing.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteSource<'a>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Returns the trust report for `image_ref`.
    #[must_use]
    pub fn status(&self, image_ref: &ImageRef) -> TrustStatusReport {
        let StateLookup::Found(record) = self.state.load(image_ref) else {
            return TrustStatusReport::unknown(image_ref.clone());
        };
        let attestations = self
            .digest_for(image_ref)
            .map(|digest| {
                self.attestations
                    .find_bound_to(&digest)
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect()
            })
            .unwrap_or_default();
        report_from_record(image_ref, record, attestations)
    }

    /// Validates every attestation for `image_ref` against its current record.
    #[must_use]
    pub fn verify(&self, image_ref: &ImageRef) -> TrustVerifyReport {
        let mut report = TrustVerifyReport {
            schema_version: TRUST_REPORT_SCHEMA_VERSION.to_string(),
            image_ref: image_ref.clone(),
            status: TrustStatus::Unknown,
            image_digest: String::new(),
            expected_results_hash: String::new(),
            attestations: Vec::new(),
        };
        let StateLookup::Found(record) = self.state.load(image_ref) else {
            return report;
        };
        report.status = TrustStatus::Fail;
        let Ok(expected) = CanonicalHasher::hash(&record) else {
            return report;
        };
        report.expected_results_hash = expected.as_str().to_string();
        if let Some(digest) = self.digest_for(image_ref) {
            report.image_digest = digest.to_string();
            report.attestations = self.attestations.validate_all(&digest, Some(&expected));
        }
        if report.attestations.iter().any(AttestationValidation::is_valid) {
            report.status = TrustStatus::Pass;
        }
        report
    }

    /// Resolves the digest and refreshes remote attestations for it.
    fn digest_for(&self, image_ref: &ImageRef) -> Option<ImageDigest> {
        let digest = self.state.resolver().resolve(image_ref).ok()?;
        if let Some(remote) = &self.remote {
            remote.sync(self.attestations, &digest);
        }
        Some(digest)
    }
}

/// Copies record fields into a report.
fn report_from_record(
    image_ref: &ImageRef,
    record: VerificationRecord,
    attestations: Vec<String>,
) -> TrustStatusReport {
    TrustStatusReport {
        schema_version: TRUST_REPORT_SCHEMA_VERSION.to_string(),
        image_ref: image_ref.clone(),
        status: TrustStatus::from(record.status),
        profile_used: record.profile_used,
        violations: record.policy_decision.violations,
        warnings: record.policy_decision.warnings,
        sbom_present: record.sbom_present,
        attestations,
        timestamp: record.timestamp,
    }
}
