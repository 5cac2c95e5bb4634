// crates/acc-core/src/runtime/forge.rs
// ============================================================================
// Module: ACC Attestation Forge
// Description: Builds, persists, signs, and publishes attestation documents.
// Purpose: Turn an authoritative verification record into a bound attestation.
// Dependencies: crate::{audit, core, interfaces, runtime}, ed25519-dalek, serde_json
// ============================================================================

//! ## Overview
//! Forging happens in two phases. [`AttestationForge::prepare`] loads the
//! verification record, checks that it describes the target image, computes
//! the results hash, and assembles the document. It has no side effects, so
//! a missing record or an image mismatch aborts before anything is announced
//! or written. [`PreparedAttestation::write`] then creates the document
//! (never overwriting), writes the optional detached envelope, updates the
//! last-attestation pointer, and optionally publishes to a registry.
//!
//! Publishing is best effort: a failed push is audited and reported on the
//! result but never invalidates the local attestation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use ed25519_dalek::SigningKey;
use thiserror::Error;

use crate::audit::AuditOutcome;
use crate::audit::TrustAuditEvent;
use crate::audit::TrustAuditSink;
use crate::core::attestation::ATTESTATION_SCHEMA_VERSION;
use crate::core::attestation::AttestationDocument;
use crate::core::attestation::AttestationEvidence;
use crate::core::attestation::AttestationMetadata;
use crate::core::attestation::AttestationSubject;
use crate::core::attestation::LastAttestationPointer;
use crate::core::attestation::TOOL_NAME;
use crate::core::hashing::HashError;
use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::core::record::PolicyMode;
use crate::core::record::VerificationRecord;
use crate::core::time::TimeError;
use crate::interfaces::Clock;
use crate::interfaces::PublishRequest;
use crate::interfaces::RegistryClient;
use crate::interfaces::RemoteTarget;
use crate::runtime::envelope;
use crate::runtime::envelope::EnvelopeError;
use crate::runtime::layout::TrustLayout;
use crate::runtime::layout::create_exclusive;
use crate::runtime::layout::create_unique;
use crate::runtime::layout::envelope_path;
use crate::runtime::registry::attestation_tag;
use crate::runtime::results_hash::CanonicalHasher;
use crate::runtime::state::ImageMismatch;
use crate::runtime::state::NotFoundReason;
use crate::runtime::state::StateError;
use crate::runtime::state::StateLookup;
use crate::runtime::state::VerificationStateStore;
use crate::runtime::state::match_image;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default policy pack location recorded in evidence.
pub const DEFAULT_POLICY_PACK: &str = ".acc/policy";
/// SBOM file suffixes probed in the SBOM directory.
const SBOM_SUFFIXES: [&str; 2] = [".spdx.json", ".cdx.json"];

// ============================================================================
// SECTION: Options
// ============================================================================

/// Caller-supplied attestation settings.
#[derive(Debug, Clone)]
pub struct AttestOptions {
    /// Policy pack recorded in evidence.
    pub policy_pack: String,
    /// Policy mode recorded in evidence.
    pub policy_mode: PolicyMode,
    /// Directory searched for a generated SBOM.
    pub sbom_dir: PathBuf,
    /// Tool version recorded in metadata.
    pub tool_version: String,
    /// Source commit recorded in metadata.
    pub git_commit: String,
    /// Key used to write a detached envelope.
    pub signing_key: Option<SigningKey>,
    /// Registry target for best-effort publishing.
    pub publish: Option<RemoteTarget>,
}

impl Default for AttestOptions {
    fn default() -> Self {
        Self {
            policy_pack: DEFAULT_POLICY_PACK.to_string(),
            policy_mode: PolicyMode::Enforce,
            sbom_dir: PathBuf::from(".acc/sbom"),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: String::new(),
            signing_key: None,
            publish: None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Attestation creation failures.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// No usable verification record exists.
    #[error("no verification state for {image_ref} ({reason}); run `acc verify {image_ref}` first")]
    NoVerificationState {
        /// Target image.
        image_ref: ImageRef,
        /// Why the lookup failed.
        reason: String,
    },
    /// The record describes another image.
    #[error("{0}; run `acc verify {requested}` first", requested = .0.requested)]
    ImageMismatch(ImageMismatch),
    /// Results hash computation failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Timestamp formatting failed.
    #[error(transparent)]
    Time(#[from] TimeError),
    /// Document serialization failed.
    #[error("failed to serialize attestation: {0}")]
    Serialize(String),
    /// Signing failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// Pointer update failed.
    #[error(transparent)]
    State(#[from] StateError),
    /// Filesystem write failed.
    #[error("failed to write {path}: {message}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Forge
// ============================================================================

/// Creates attestation documents from verification state.
pub struct AttestationForge<'a> {
    /// Storage layout.
    layout: &'a TrustLayout,
    /// Verification state.
    state: &'a VerificationStateStore<'a>,
    /// Time source.
    clock: &'a dyn Clock,
    /// Audit sink.
    audit: &'a dyn TrustAuditSink,
    /// Registry client for publishing.
    registry: Option<&'a dyn RegistryClient>,
}

impl<'a> AttestationForge<'a> {
    /// Creates a forge without a registry client.
    #[must_use]
    pub fn new(
        layout: &'a TrustLayout,
        state: &'a VerificationStateStore<'a>,
        clock: &'a dyn Clock,
        audit: &'a dyn TrustAuditSink,
    ) -> Self {
        Self {
            layout,
            state,
            clock,
            audit,
            registry: None,
        }
    }

    /// Attaches a registry client used when options request publishing.
    #[must_use]
    pub fn with_registry(mut self, registry: &'a dyn RegistryClient) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Runs every check and assembles the document without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::NoVerificationState`] or
    /// [`ForgeError::ImageMismatch`] before anything is written, or a hash or
    /// time error.
    pub fn prepare(
        &self,
        image_ref: &ImageRef,
        options: &AttestOptions,
    ) -> Result<PreparedAttestation<'_, 'a>, ForgeError> {
        let resolver = self.state.resolver();
        let target_digest = resolver.resolve(image_ref).ok();
        let record = self.load_record(image_ref)?;
        match_image(resolver, image_ref, target_digest.as_ref(), &record)
            .map_err(ForgeError::ImageMismatch)?;

        let results_hash = CanonicalHasher::hash(&record)?;
        let now = self.clock.now();
        let digest = target_digest.or_else(|| record.digest());
        let sbom_ref = find_sbom(&options.sbom_dir, image_ref, digest.as_ref())
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let document = AttestationDocument {
            schema_version: ATTESTATION_SCHEMA_VERSION.to_string(),
            timestamp: now.to_rfc3339()?,
            subject: AttestationSubject {
                image_ref: image_ref.clone(),
                image_digest: digest.as_ref().map(ToString::to_string).unwrap_or_default(),
            },
            evidence: AttestationEvidence {
                sbom_ref,
                policy_pack: options.policy_pack.clone(),
                policy_mode: options.policy_mode.as_str().to_string(),
                verification_status: record.status,
                verification_results_hash: results_hash.into_string(),
            },
            metadata: AttestationMetadata {
                tool: TOOL_NAME.to_string(),
                tool_version: options.tool_version.clone(),
                git_commit: options.git_commit.clone(),
            },
        };
        let dir = match &digest {
            Some(digest) => self.layout.local_dir(digest),
            None => self.layout.unresolved_dir(image_ref),
        };
        Ok(PreparedAttestation {
            forge: self,
            document,
            dir,
            stem: now.file_stamp(),
            digest,
            signing_key: options.signing_key.clone(),
            publish: options.publish.clone(),
        })
    }

    /// Prepares and writes in one step.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] from either phase.
    pub fn create(
        &self,
        image_ref: &ImageRef,
        options: &AttestOptions,
    ) -> Result<ForgedAttestation, ForgeError> {
        self.prepare(image_ref, options)?.write()
    }

    /// Loads the record for `image_ref`, falling back to the last record so
    /// a mismatch can be reported with both identities.
    fn load_record(&self, image_ref: &ImageRef) -> Result<VerificationRecord, ForgeError> {
        let reason = match self.state.load(image_ref) {
            StateLookup::Found(record) => return Ok(record),
            StateLookup::NotFound(reason) => reason,
        };
        let fallback = match reason {
            NotFoundReason::ImageMismatch {
                ..
            }
            | NotFoundReason::DigestMismatch {
                ..
            } => self.state.load_last().into_record(),
            _ => None,
        };
        fallback.ok_or_else(|| ForgeError::NoVerificationState {
            image_ref: image_ref.clone(),
            reason: reason.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Prepared Attestation
// ============================================================================

/// Fully checked attestation awaiting persistence.
pub struct PreparedAttestation<'f, 'a> {
    /// Owning forge.
    forge: &'f AttestationForge<'a>,
    /// Document to write.
    document: AttestationDocument,
    /// Destination directory.
    dir: PathBuf,
    /// File name stem.
    stem: String,
    /// Subject digest, when known.
    digest: Option<ImageDigest>,
    /// Optional signing key.
    signing_key: Option<SigningKey>,
    /// Optional publish target.
    publish: Option<RemoteTarget>,
}

/// Result of a successful attestation write.
#[derive(Debug, Clone)]
pub struct ForgedAttestation {
    /// Written document.
    pub document: AttestationDocument,
    /// Document path.
    pub path: PathBuf,
    /// Detached envelope path, when signed.
    pub envelope: Option<PathBuf>,
    /// Pushed artifact reference, when published.
    pub published: Option<String>,
    /// Publish failure, when publishing was requested and failed.
    pub publish_error: Option<String>,
}

impl PreparedAttestation<'_, '_> {
    /// Returns the document that will be written.
    #[must_use]
    pub const fn document(&self) -> &AttestationDocument {
        &self.document
    }

    /// Persists the document, envelope, and pointer, then publishes.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when a local write fails. Publish failures are
    /// reported on the result instead.
    pub fn write(self) -> Result<ForgedAttestation, ForgeError> {
        let forge = self.forge;
        let subject = &self.document.subject;
        forge.audit.record(
            &TrustAuditEvent::new("attestation_started", AuditOutcome::Ok)
                .image(&subject.image_ref)
                .digest(&subject.image_digest),
        );
        let bytes = serde_json::to_vec_pretty(&self.document)
            .map_err(|err| ForgeError::Serialize(err.to_string()))?;
        let path = create_unique(&self.dir, &self.stem, &bytes).map_err(|err| ForgeError::Io {
            path: self.dir.clone(),
            message: err.to_string(),
        })?;
        forge.audit.record(
            &TrustAuditEvent::new("attestation_written", AuditOutcome::Ok)
                .image(&subject.image_ref)
                .digest(&subject.image_digest)
                .path(&path),
        );

        let envelope = match &self.signing_key {
            Some(key) => Some(forge.write_envelope(&self.document, &path, key)?),
            None => None,
        };

        forge.state.save_last_attestation(&LastAttestationPointer {
            output_path: path.display().to_string(),
            timestamp: self.document.timestamp.clone(),
            image_ref: subject.image_ref.clone(),
            image_digest: subject.image_digest.clone(),
            status: self.document.evidence.verification_status,
        })?;

        let (published, publish_error) = match &self.publish {
            Some(target) => match forge.publish(target, self.digest.as_ref(), &path, envelope.as_deref()) {
                Ok(reference) => (Some(reference), None),
                Err(reason) => {
                    forge.audit.record(
                        &TrustAuditEvent::new("attestation_publish_failed", AuditOutcome::Degraded)
                            .image(&subject.image_ref)
                            .reason(&reason)
                            .path(&path),
                    );
                    (None, Some(reason))
                }
            },
            None => (None, None),
        };

        Ok(ForgedAttestation {
            document: self.document,
            path,
            envelope,
            published,
            publish_error,
        })
    }
}

impl AttestationForge<'_> {
    /// Signs `document` and writes the envelope beside `path`.
    fn write_envelope(
        &self,
        document: &AttestationDocument,
        path: &Path,
        key: &SigningKey,
    ) -> Result<PathBuf, ForgeError> {
        let sealed = envelope::sign(document, key)?;
        let bytes =
            serde_json::to_vec_pretty(&sealed).map_err(|err| ForgeError::Serialize(err.to_string()))?;
        let sig_path = envelope_path(path);
        create_exclusive(&sig_path, &bytes).map_err(|err| ForgeError::Io {
            path: sig_path.clone(),
            message: err.to_string(),
        })?;
        self.audit.record(
            &TrustAuditEvent::new("attestation_signed", AuditOutcome::Ok)
                .digest(&document.subject.image_digest)
                .reason(&sealed.key_id)
                .path(&sig_path),
        );
        Ok(sig_path)
    }

    /// Pushes the document and envelope; returns a failure reason on error.
    fn publish(
        &self,
        target: &RemoteTarget,
        digest: Option<&ImageDigest>,
        document: &Path,
        envelope: Option<&Path>,
    ) -> Result<String, String> {
        let registry = self.registry.ok_or_else(|| "no registry client configured".to_string())?;
        let digest = digest.ok_or_else(|| "image digest unresolved".to_string())?;
        registry
            .publish(&PublishRequest {
                target: target.clone(),
                tag: attestation_tag(digest),
                document: document.to_path_buf(),
                envelope: envelope.map(Path::to_path_buf),
            })
            .map_err(|err| err.to_string())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Finds a generated SBOM for the image, preferring the digest-named file.
#[must_use]
pub fn find_sbom(
    dir: &Path,
    image_ref: &ImageRef,
    digest: Option<&ImageDigest>,
) -> Option<PathBuf> {
    let mut stems = Vec::with_capacity(2);
    if let Some(digest) = digest {
        stems.push(digest.to_string());
    }
    stems.push(image_ref.sanitized());
    stems
        .iter()
        .flat_map(|stem| SBOM_SUFFIXES.iter().map(move |suffix| dir.join(format!("{stem}{suffix}"))))
        .find(|candidate| candidate.is_file())
}
