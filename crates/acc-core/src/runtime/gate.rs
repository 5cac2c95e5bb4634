// crates/acc-core/src/runtime/gate.rs
// ============================================================================
// Module: ACC Enforcement Gate
// Description: Trust checks guarding run and push.
// Purpose: Allow a workload only when its verification and attestations hold.
// Dependencies: crate::{audit, core, runtime}, thiserror
// ============================================================================

//! ## Overview
//! The gate is used identically by `run` and `push`:
//!
//! 1. A verification record must exist and must not be `fail`.
//! 2. The record must describe the target image (digest first, ref string as
//!    fallback).
//! 3. With attestation enforcement on, at least one attestation for the digest
//!    must pass full validation against the record's results hash.
//!
//! A returned [`GateApproval`] is final. Failures in the caller's later
//! run/push step are operational and never revoke it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::audit::AuditOutcome;
use crate::audit::TrustAuditEvent;
use crate::audit::TrustAuditSink;
use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::core::record::VerificationRecord;
use crate::core::record::VerificationStatus;
use crate::core::report::EXIT_FAIL;
use crate::runtime::attestations::AttestationStore;
use crate::runtime::results_hash::CanonicalHasher;
use crate::runtime::state::ImageMismatch;
use crate::runtime::state::StateLookup;
use crate::runtime::state::VerificationStateStore;
use crate::runtime::state::match_image;
use crate::runtime::status::RemoteSource;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Operation guarded by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Container execution.
    Run,
    /// Image distribution.
    Push,
}

impl GateAction {
    /// Returns the command label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful gate decision.
#[derive(Debug, Clone)]
pub struct GateApproval {
    /// Record the decision rests on.
    pub record: VerificationRecord,
    /// Resolved digest of the target, when known.
    pub digest: Option<ImageDigest>,
    /// First fully valid attestation, when enforcement required one.
    pub attestation: Option<PathBuf>,
}

/// Trust-based refusal. Every variant exits 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateDenial {
    /// No usable verification record.
    #[error("{image_ref} has not been verified ({reason}); run `acc verify {image_ref}`")]
    NotVerified {
        /// Target image.
        image_ref: ImageRef,
        /// Lookup failure reason.
        reason: String,
    },
    /// The record's status is `fail`.
    #[error("verification failed for {image_ref}; resolve the violations and run `acc verify {image_ref}`")]
    VerificationFailed {
        /// Target image.
        image_ref: ImageRef,
    },
    /// The record describes another image.
    #[error("{0}; run `acc verify {requested}`", requested = .0.requested)]
    ImageMismatch(ImageMismatch),
    /// Enforcement requires an attestation and none is valid.
    #[error("no valid attestation for {image_ref} ({reason}); run `acc attest {image_ref}`")]
    AttestationRequired {
        /// Target image.
        image_ref: ImageRef,
        /// Why no attestation qualified.
        reason: String,
    },
}

impl GateDenial {
    /// Returns the process exit code for a denial.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        EXIT_FAIL
    }

    /// Returns a short label for audit events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotVerified {
                ..
            } => "not_verified",
            Self::VerificationFailed {
                ..
            } => "verification_failed",
            Self::ImageMismatch(_) => "image_mismatch",
            Self::AttestationRequired {
                ..
            } => "attestation_required",
        }
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Enforcement gate for run and push.
pub struct EnforcementGate<'a> {
    /// Verification state.
    state: &'a VerificationStateStore<'a>,
    /// Attestation discovery and validation.
    attestations: &'a AttestationStore<'a>,
    /// Audit sink.
    audit: &'a dyn TrustAuditSink,
    /// Whether a valid attestation is mandatory.
    require_attestation: bool,
    /// Optional remote attestation source.
    remote: Option<RemoteSource<'a>>,
}

impl<'a> EnforcementGate<'a> {
    /// Creates a gate.
    #[must_use]
    pub const fn new(
        state: &'a VerificationStateStore<'a>,
        attestations: &'a AttestationStore<'a>,
        audit: &'a dyn TrustAuditSink,
        require_attestation: bool,
    ) -> Self {
        Self {
            state,
            attestations,
            audit,
            require_attestation,
            remote: None,
        }
    }

    /// Fetches remote attestations before enforcement checks.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteSource<'a>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Decides whether `action` may proceed for `image_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`GateDenial`] when any trust check fails.
    pub fn check(&self, action: GateAction, image_ref: &ImageRef) -> Result<GateApproval, GateDenial> {
        let decision = self.decide(image_ref);
        let event = match &decision {
            Ok(_) => TrustAuditEvent::new("gate_decision", AuditOutcome::Ok).reason(action),
            Err(denial) => TrustAuditEvent::new("gate_decision", AuditOutcome::Denied)
                .reason(format!("{action}: {}", denial.label())),
        };
        self.audit.record(&event.image(image_ref));
        decision
    }

    /// Applies the three gate checks in order.
    fn decide(&self, image_ref: &ImageRef) -> Result<GateApproval, GateDenial> {
        let record = match self.state.load(image_ref) {
            StateLookup::Found(record) => record,
            StateLookup::NotFound(reason) => {
                return Err(GateDenial::NotVerified {
                    image_ref: image_ref.clone(),
                    reason: reason.to_string(),
                });
            }
        };
        if record.status == VerificationStatus::Fail {
            return Err(GateDenial::VerificationFailed {
                image_ref: image_ref.clone(),
            });
        }

        let resolver = self.state.resolver();
        let digest = resolver.resolve(image_ref).ok();
        match_image(resolver, image_ref, digest.as_ref(), &record).map_err(GateDenial::ImageMismatch)?;

        let attestation = if self.require_attestation {
            Some(self.require_valid_attestation(image_ref, digest.as_ref(), &record)?)
        } else {
            None
        };
        Ok(GateApproval {
            record,
            digest,
            attestation,
        })
    }

    /// Finds the first fully valid attestation for the target digest.
    fn require_valid_attestation(
        &self,
        image_ref: &ImageRef,
        digest: Option<&ImageDigest>,
        record: &VerificationRecord,
    ) -> Result<PathBuf, GateDenial> {
        let required = |reason: String| GateDenial::AttestationRequired {
            image_ref: image_ref.clone(),
            reason,
        };
        let digest = digest.ok_or_else(|| required("image digest unresolved".to_string()))?;
        let expected = CanonicalHasher::hash(record).map_err(|err| required(err.to_string()))?;
        if let Some(remote) = &self.remote {
            remote.sync(self.attestations, digest);
        }
        let results = self.attestations.validate_all(digest, Some(&expected));
        if let Some(valid) = results.iter().find(|result| result.is_valid()) {
            return Ok(valid.path.clone());
        }
        let reason = results
            .iter()
            .find_map(|result| result.invalid_reason.clone())
            .unwrap_or_else(|| "no attestations found".to_string());
        Err(required(reason))
    }
}
