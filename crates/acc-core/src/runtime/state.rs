// crates/acc-core/src/runtime/state.rs
// ============================================================================
// Module: ACC Verification State Store
// Description: Digest-keyed persistence of verification records and pointers.
// Purpose: Serve the authoritative decision for an image without cross-image leakage.
// Dependencies: crate::{audit, core, interfaces, runtime::layout}, serde_json
// ============================================================================

//! ## Overview
//! Records are written to a digest-keyed slot and to a single legacy
//! "last verification" pointer. Lookups prefer the digest slot; the pointer is
//! a single-slot cache whose staleness rule is strict: it is only valid when
//! its embedded image reference equals the query exactly, and, when both
//! digests are known, when the digests agree.
//!
//! Missing files, malformed JSON, cross-image pointers, and records whose
//! status contradicts their decision all collapse to
//! [`StateLookup::NotFound`] with a diagnosable [`NotFoundReason`]. A lookup
//! never returns a record for a different image.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::audit::AuditOutcome;
use crate::audit::TrustAuditEvent;
use crate::audit::TrustAuditSink;
use crate::core::attestation::LastAttestationPointer;
use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::core::record::RecordError;
use crate::core::record::VerificationRecord;
use crate::interfaces::DigestResolver;
use crate::runtime::layout::TrustLayout;
use crate::runtime::layout::read_limited;
use crate::runtime::layout::write_atomic;

// ============================================================================
// SECTION: Lookup Types
// ============================================================================

/// Why a lookup produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No state file exists for the query.
    NoRecord,
    /// A state file exists but could not be decoded.
    Malformed(String),
    /// The fallback pointer belongs to another image reference.
    ImageMismatch {
        /// Queried reference.
        requested: ImageRef,
        /// Reference stored in the pointer.
        recorded: ImageRef,
    },
    /// A record was found under a digest it does not carry.
    DigestMismatch {
        /// Digest the query resolved to.
        expected: String,
        /// Digest embedded in the record.
        found: String,
    },
    /// Record status contradicts its policy decision.
    Inconsistent(RecordError),
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecord => f.write_str("no verification record"),
            Self::Malformed(message) => write!(f, "malformed verification state: {message}"),
            Self::ImageMismatch {
                requested,
                recorded,
            } => write!(f, "last verification was for {recorded}, not {requested}"),
            Self::DigestMismatch {
                expected,
                found,
            } => write!(f, "verification record digest {found} does not match {expected}"),
            Self::Inconsistent(err) => write!(f, "{err}"),
        }
    }
}

/// Outcome of a verification state lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLookup {
    /// A record for the queried image.
    Found(VerificationRecord),
    /// No usable record; the caller reports `unknown`.
    NotFound(NotFoundReason),
}

impl StateLookup {
    /// Returns the record when found.
    #[must_use]
    pub fn into_record(self) -> Option<VerificationRecord> {
        match self {
            Self::Found(record) => Some(record),
            Self::NotFound(_) => None,
        }
    }

    /// Returns true when a record was found.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

// ============================================================================
// SECTION: Image Match
// ============================================================================

/// Identity disagreement between a target image and a verification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMismatch {
    /// Image the caller is acting on.
    pub requested: ImageRef,
    /// Resolved digest of the requested image, if any.
    pub requested_digest: Option<String>,
    /// Image named by the verification record.
    pub recorded: ImageRef,
    /// Digest of the recorded image, if known.
    pub recorded_digest: Option<String>,
}

impl fmt::Display for ImageMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unknown = "unresolved";
        write!(
            f,
            "image mismatch: requested {} ({}) but last verification was for {} ({})",
            self.requested,
            self.requested_digest.as_deref().unwrap_or(unknown),
            self.recorded,
            self.recorded_digest.as_deref().unwrap_or(unknown),
        )
    }
}

/// Checks that `record` describes `image_ref`.
///
/// Digests are authoritative when both sides resolve; otherwise the exact
/// reference strings must match.
///
/// # Errors
///
/// Returns [`ImageMismatch`] naming both identities.
pub fn match_image(
    resolver: &dyn DigestResolver,
    image_ref: &ImageRef,
    digest: Option<&ImageDigest>,
    record: &VerificationRecord,
) -> Result<(), ImageMismatch> {
    let recorded_digest = record.digest().or_else(|| resolver.resolve(&record.image_ref).ok());
    let matched = match (digest, &recorded_digest) {
        (Some(requested), Some(recorded)) => requested == recorded,
        _ => image_ref == &record.image_ref,
    };
    if matched {
        return Ok(());
    }
    Err(ImageMismatch {
        requested: image_ref.clone(),
        requested_digest: digest.map(ToString::to_string),
        recorded: record.image_ref.clone(),
        recorded_digest: recorded_digest.map(|digest| digest.to_string()),
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Verification state write errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// The record violates the status/decision invariant.
    #[error("refusing to save verification record: {0}")]
    Inconsistent(#[from] RecordError),
    /// Serialization failed.
    #[error("failed to serialize verification state: {0}")]
    Serialize(String),
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
// SECTION: Store
// ============================================================================

/// File-backed verification state store.
pub struct VerificationStateStore<'a> {
    /// Storage layout.
    layout: &'a TrustLayout,
    /// Digest resolver used to key lookups.
    resolver: &'a dyn DigestResolver,
    /// Audit sink.
    audit: &'a dyn TrustAuditSink,
}

impl<'a> VerificationStateStore<'a> {
    /// Creates a store over `layout`.
    #[must_use]
    pub fn new(
        layout: &'a TrustLayout,
        resolver: &'a dyn DigestResolver,
        audit: &'a dyn TrustAuditSink,
    ) -> Self {
        Self {
            layout,
            resolver,
            audit,
        }
    }

    /// Returns the resolver backing this store.
    #[must_use]
    pub fn resolver(&self) -> &'a dyn DigestResolver {
        self.resolver
    }

    /// Persists a record to its digest slot and the legacy pointer.
    ///
    /// Returns the digest-scoped path when the record carries a digest,
    /// otherwise the pointer path.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the record is inconsistent or cannot be written.
    pub fn save(&self, record: &VerificationRecord) -> Result<PathBuf, StateError> {
        record.check_consistency()?;
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|err| StateError::Serialize(err.to_string()))?;
        let mut primary = self.layout.last_verify();
        if let Some(digest) = record.digest() {
            primary = self.layout.verify_record(&digest);
            write_state(&primary, &bytes)?;
        }
        write_state(&self.layout.last_verify(), &bytes)?;
        self.audit.record(
            &TrustAuditEvent::new("verification_saved", AuditOutcome::Ok)
                .image(&record.image_ref)
                .digest(&record.image_digest)
                .reason(record.status)
                .path(&primary),
        );
        Ok(primary)
    }

    /// Loads the record for an image reference.
    ///
    /// Resolves the digest first; falls back to the legacy pointer only when
    /// the digest slot is absent and the pointer names exactly this reference.
    #[must_use]
    pub fn load(&self, image_ref: &ImageRef) -> StateLookup {
        let digest = self.resolver.resolve(image_ref).ok();
        let lookup = self.lookup(image_ref, digest.as_ref());
        let event = match &lookup {
            StateLookup::Found(record) => TrustAuditEvent::new("state_lookup", AuditOutcome::Ok)
                .reason(record.status),
            StateLookup::NotFound(reason) => {
                TrustAuditEvent::new("state_lookup", AuditOutcome::Denied).reason(reason)
            }
        };
        let event = match &digest {
            Some(digest) => event.image(image_ref).digest(digest),
            None => event.image(image_ref),
        };
        self.audit.record(&event);
        lookup
    }

    /// Loads the legacy pointer record regardless of which image it names.
    ///
    /// Callers must perform their own image-match check before acting on it.
    #[must_use]
    pub fn load_last(&self) -> StateLookup {
        match read_json::<VerificationRecord>(&self.layout.last_verify()) {
            Ok(record) => match record.check_consistency() {
                Ok(()) => StateLookup::Found(record),
                Err(err) => StateLookup::NotFound(NotFoundReason::Inconsistent(err)),
            },
            Err(reason) => StateLookup::NotFound(reason),
        }
    }

    /// Writes the "last attestation" pointer.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the pointer cannot be written.
    pub fn save_last_attestation(&self, pointer: &LastAttestationPointer) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(pointer)
            .map_err(|err| StateError::Serialize(err.to_string()))?;
        write_state(&self.layout.last_attestation(), &bytes)
    }

    /// Reads the "last attestation" pointer when it names `image_ref`.
    #[must_use]
    pub fn load_last_attestation(&self, image_ref: &ImageRef) -> Option<LastAttestationPointer> {
        read_json::<LastAttestationPointer>(&self.layout.last_attestation())
            .ok()
            .filter(|pointer| &pointer.image_ref == image_ref)
    }

    /// Resolves a lookup for a reference and optional digest.
    fn lookup(&self, image_ref: &ImageRef, digest: Option<&ImageDigest>) -> StateLookup {
        if let Some(digest) = digest {
            match read_json::<VerificationRecord>(&self.layout.verify_record(digest)) {
                Ok(record) => return accept(record, Some(digest)),
                Err(NotFoundReason::NoRecord) => {}
                Err(reason) => return StateLookup::NotFound(reason),
            }
        }
        let record = match read_json::<VerificationRecord>(&self.layout.last_verify()) {
            Ok(record) => record,
            Err(reason) => return StateLookup::NotFound(reason),
        };
        if &record.image_ref != image_ref {
            return StateLookup::NotFound(NotFoundReason::ImageMismatch {
                requested: image_ref.clone(),
                recorded: record.image_ref,
            });
        }
        accept(record, digest)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies digest isolation and consistency checks to a decoded record.
fn accept(record: VerificationRecord, digest: Option<&ImageDigest>) -> StateLookup {
    if let Some(expected) = digest
        && !record.image_digest.is_empty()
        && !expected.matches(&record.image_digest)
    {
        return StateLookup::NotFound(NotFoundReason::DigestMismatch {
            expected: expected.to_string(),
            found: record.image_digest,
        });
    }
    match record.check_consistency() {
        Ok(()) => StateLookup::Found(record),
        Err(err) => StateLookup::NotFound(NotFoundReason::Inconsistent(err)),
    }
}

/// Reads and decodes a JSON state file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, NotFoundReason> {
    let bytes = match read_limited(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(NotFoundReason::NoRecord),
        Err(err) => return Err(NotFoundReason::Malformed(err.to_string())),
    };
    serde_json::from_slice(&bytes).map_err(|err| NotFoundReason::Malformed(err.to_string()))
}

/// Writes a state file atomically.
fn write_state(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    write_atomic(path, bytes).map_err(|err| StateError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
