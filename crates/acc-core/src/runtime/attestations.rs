// crates/acc-core/src/runtime/attestations.rs
// ============================================================================
// Module: ACC Attestation Store
// Description: Digest-scoped discovery and validation of attestation files.
// Purpose: Surface only the attestations that belong to one image digest.
// Dependencies: crate::{audit, core, interfaces, runtime}, serde_json
// ============================================================================

//! ## Overview
//! Attestations live under `attestations/<prefix12>/`, split into `local/`
//! and `remote/<registry>/<repo>/`. Discovery walks that one directory tree,
//! never follows symlinks, and skips detached envelopes and temporary files.
//!
//! Validation reports each binding separately (schema, digest, results hash)
//! so operators can tell which one failed. A document that does not parse is
//! invalid, never absent. A detached envelope that fails verification forces
//! `validSchema = false` regardless of the structural checks. With a
//! trusted-key list configured, a document without an envelope is rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::audit::AuditOutcome;
use crate::audit::TrustAuditEvent;
use crate::audit::TrustAuditSink;
use crate::core::attestation::REQUIRED_ATTESTATION_FIELDS;
use crate::core::attestation::SignatureEnvelope;
use crate::core::hashing::Sha256Hex;
use crate::core::identifiers::ImageDigest;
use crate::interfaces::RegistryClient;
use crate::interfaces::RegistryError;
use crate::interfaces::RemoteTarget;
use crate::runtime::envelope;
use crate::runtime::layout::TrustLayout;
use crate::runtime::layout::envelope_path;
use crate::runtime::layout::is_envelope_path;
use crate::runtime::layout::read_limited;
use crate::runtime::registry::attestation_tag;

// ============================================================================
// SECTION: Validation Result
// ============================================================================

/// Per-binding validation outcome for one attestation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationValidation {
    /// Validated file.
    pub path: PathBuf,
    /// Required fields present and any detached signature verified.
    pub valid_schema: bool,
    /// Subject digest equals the digest under evaluation.
    pub digest_match: bool,
    /// Embedded results hash equals the expected hash.
    pub results_hash_match: bool,
    /// Whether a detached envelope accompanied the document.
    pub signed: bool,
    /// First failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl AttestationValidation {
    /// Returns true when every binding holds.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid_schema && self.digest_match && self.results_hash_match
    }

    /// Creates a result with every check failed.
    fn rejected(path: &Path, reason: String) -> Self {
        Self {
            path: path.to_path_buf(),
            valid_schema: false,
            digest_match: false,
            results_hash_match: false,
            signed: false,
            invalid_reason: Some(reason),
        }
    }

    /// Records `reason` unless an earlier failure already did.
    fn fail(&mut self, reason: impl Into<String>) {
        if self.invalid_reason.is_none() {
            self.invalid_reason = Some(reason.into());
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Read side of the attestation directory tree.
pub struct AttestationStore<'a> {
    /// Storage layout.
    layout: &'a TrustLayout,
    /// Audit sink.
    audit: &'a dyn TrustAuditSink,
    /// Accepted signer key ids; empty accepts any valid signer.
    trusted_keys: &'a [String],
}

impl<'a> AttestationStore<'a> {
    /// Creates a store over `layout`.
    #[must_use]
    pub fn new(
        layout: &'a TrustLayout,
        audit: &'a dyn TrustAuditSink,
        trusted_keys: &'a [String],
    ) -> Self {
        Self {
            layout,
            audit,
            trusted_keys,
        }
    }

    /// Lists attestation documents for `digest`, sorted by path.
    ///
    /// Returns an empty list when the digest directory is absent.
    #[must_use]
    pub fn find_for_digest(&self, digest: &ImageDigest) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_documents(&self.layout.digest_dir(digest), &mut found);
        found.sort();
        found
    }

    /// Lists documents under the digest directory whose subject names exactly `digest`.
    ///
    /// The directory is keyed by the 12-hex prefix, so digests sharing a
    /// prefix share it; unreadable or foreign documents are left out.
    #[must_use]
    pub fn find_bound_to(&self, digest: &ImageDigest) -> Vec<PathBuf> {
        self.find_for_digest(digest)
            .into_iter()
            .filter(|path| subject_matches(path, digest))
            .collect()
    }

    /// Validates one attestation file against a digest and optional results hash.
    #[must_use]
    pub fn validate(
        &self,
        path: &Path,
        expected_digest: &ImageDigest,
        expected_results_hash: Option<&Sha256Hex>,
    ) -> AttestationValidation {
        let result = self.validate_inner(path, expected_digest, expected_results_hash);
        if let Some(reason) = &result.invalid_reason {
            self.audit.record(
                &TrustAuditEvent::new("attestation_rejected", AuditOutcome::Denied)
                    .digest(expected_digest)
                    .reason(reason)
                    .path(path),
            );
        }
        result
    }

    /// Validates every attestation for `digest`.
    #[must_use]
    pub fn validate_all(
        &self,
        digest: &ImageDigest,
        expected_results_hash: Option<&Sha256Hex>,
    ) -> Vec<AttestationValidation> {
        self.find_for_digest(digest)
            .iter()
            .map(|path| self.validate(path, digest, expected_results_hash))
            .collect()
    }

    /// Pulls remote attestations for `digest` into the digest directory.
    ///
    /// Failures are audited as degraded; callers continue with local
    /// attestations.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the fetch fails.
    pub fn sync_remote(
        &self,
        client: &dyn RegistryClient,
        target: &RemoteTarget,
        digest: &ImageDigest,
    ) -> Result<Vec<PathBuf>, RegistryError> {
        let dest = self.layout.remote_dir(digest, target);
        let result = fs::create_dir_all(&dest)
            .map_err(|err| RegistryError::Failed(format!("{}: {err}", dest.display())))
            .and_then(|()| client.fetch(target, &attestation_tag(digest), &dest));
        if let Err(err) = &result {
            self.audit.record(
                &TrustAuditEvent::new("remote_fetch_failed", AuditOutcome::Degraded)
                    .digest(digest)
                    .reason(err)
                    .path(&dest),
            );
        }
        result
    }

    /// Runs the structural, binding, and signature checks.
    fn validate_inner(
        &self,
        path: &Path,
        expected_digest: &ImageDigest,
        expected_results_hash: Option<&Sha256Hex>,
    ) -> AttestationValidation {
        let bytes = match read_limited(path) {
            Ok(bytes) => bytes,
            Err(err) => return AttestationValidation::rejected(path, format!("unreadable: {err}")),
        };
        let document: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => return AttestationValidation::rejected(path, format!("invalid json: {err}")),
        };
        let mut result = AttestationValidation {
            path: path.to_path_buf(),
            valid_schema: true,
            digest_match: false,
            results_hash_match: expected_results_hash.is_none(),
            signed: false,
            invalid_reason: None,
        };

        let missing = REQUIRED_ATTESTATION_FIELDS
            .iter()
            .find(|field| document.get(**field).is_none_or(Value::is_null));
        if let Some(field) = missing {
            result.valid_schema = false;
            result.fail(format!("missing field {field}"));
        }

        let subject_digest = string_at(&document, "/subject/imageDigest");
        result.digest_match = !subject_digest.is_empty() && expected_digest.matches(subject_digest);
        if !result.digest_match {
            result.fail("digest mismatch");
        }

        if let Some(expected) = expected_results_hash {
            let embedded = string_at(&document, "/evidence/verificationResultsHash");
            if embedded.is_empty() {
                result.fail("missing results hash");
            } else if expected.matches(embedded) {
                result.results_hash_match = true;
            } else {
                result.fail("results hash mismatch");
            }
        }

        if let Some(failure) = self.check_envelope(path, &document, &mut result) {
            result.valid_schema = false;
            result.fail(failure);
        }
        result
    }

    /// Verifies the detached envelope beside `path`, if any.
    fn check_envelope(
        &self,
        path: &Path,
        document: &Value,
        result: &mut AttestationValidation,
    ) -> Option<String> {
        let sig_path = envelope_path(path);
        let bytes = match read_limited(&sig_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return (!self.trusted_keys.is_empty()).then(|| "signature required".to_string());
            }
            Err(err) => return Some(format!("signature unreadable: {err}")),
        };
        result.signed = true;
        let sealed: SignatureEnvelope = match serde_json::from_slice(&bytes) {
            Ok(sealed) => sealed,
            Err(err) => return Some(format!("signature envelope invalid: {err}")),
        };
        envelope::check_trusted(document, &sealed, self.trusted_keys)
            .err()
            .map(|err| format!("signature invalid: {err}"))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the trimmed string at a JSON pointer, or empty.
fn string_at<'v>(document: &'v Value, pointer: &str) -> &'v str {
    document.pointer(pointer).and_then(Value::as_str).map_or("", str::trim)
}

/// Returns true when the document at `path` names `digest` as its subject.
fn subject_matches(path: &Path, digest: &ImageDigest) -> bool {
    read_limited(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .is_some_and(|document| {
            let subject = string_at(&document, "/subject/imageDigest");
            !subject.is_empty() && digest.matches(subject)
        })
}

/// Recursively collects attestation documents without following symlinks.
fn collect_documents(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            collect_documents(&path, found);
        } else if file_type.is_file() && is_document(&path) {
            found.push(path);
        }
    }
}

/// Returns true for visible `.json` files that are not envelopes.
fn is_document(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    !name.starts_with('.')
        && path.extension().is_some_and(|ext| ext == "json")
        && !is_envelope_path(path)
}
