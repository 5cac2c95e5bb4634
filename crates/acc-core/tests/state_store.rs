// crates/acc-core/tests/state_store.rs
// ============================================================================
// Module: Verification State Store Tests
// Description: Digest isolation, fallback guards, and unknown reports.
// ============================================================================
//! ## Overview
//! Validates that verification lookups never return another image's record
//! and that every unusable state collapses to `NotFound` / `unknown`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and fixtures."
)]

use std::fs;

use acc_core::AttestationStore;
use acc_core::ImageDigest;
use acc_core::ImageRef;
use acc_core::MemoryAuditSink;
use acc_core::PolicyDecision;
use acc_core::PolicyMode;
use acc_core::RecordInput;
use acc_core::StateLookup;
use acc_core::TrustLayout;
use acc_core::TrustStatus;
use acc_core::TrustStatusAggregator;
use acc_core::VerificationRecord;
use acc_core::VerificationStateStore;
use acc_core::VerificationStatus;
use acc_core::runtime::NotFoundReason;
use acc_core::runtime::StateError;
use acc_core::runtime::StaticDigestResolver;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const DIGEST_A: &str = "sha256:aaaaaaaaaaaa1111111111111111111111111111111111111111111111111111";
const DIGEST_B: &str = "sha256:bbbbbbbbbbbb2222222222222222222222222222222222222222222222222222";

fn digest(raw: &str) -> ImageDigest {
    ImageDigest::parse(raw).unwrap()
}

fn record(image_ref: &str, digest_raw: Option<&str>, allow: bool, mode: PolicyMode) -> VerificationRecord {
    VerificationRecord::from_decision(RecordInput {
        image_ref: ImageRef::new(image_ref),
        image_digest: digest_raw.map(digest),
        decision: PolicyDecision {
            allow,
            violations: Vec::new(),
            warnings: Vec::new(),
        },
        mode,
        sbom_present: allow,
        profile_used: Some("default".to_string()),
        waivers: Vec::new(),
        timestamp: "2024-05-01T12:00:00Z".to_string(),
    })
}

fn resolver() -> StaticDigestResolver {
    StaticDigestResolver::new().with("app:a", digest(DIGEST_A)).with("app:b", digest(DIGEST_B))
}

// ============================================================================
// SECTION: Lookups
// ============================================================================

/// Tests records are stored per digest and survive later verifications.
#[test]
fn digest_slots_are_independent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = resolver();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);

    let saved = state.save(&record("app:a", Some(DIGEST_A), true, PolicyMode::Enforce)).unwrap();
    assert_eq!(saved, layout.verify_record(&digest(DIGEST_A)));
    state.save(&record("app:b", Some(DIGEST_B), false, PolicyMode::Enforce)).unwrap();

    let a = state.load(&ImageRef::new("app:a")).into_record().unwrap();
    let b = state.load(&ImageRef::new("app:b")).into_record().unwrap();
    assert_eq!(a.status, VerificationStatus::Pass);
    assert_eq!(b.status, VerificationStatus::Fail);
    assert!(audit.saw("verification_saved"));
    assert!(audit.saw("state_lookup"));
}

/// Tests the legacy pointer is ignored for a different image reference.
#[test]
fn fallback_pointer_never_crosses_images() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = StaticDigestResolver::new();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);
    state.save(&record("app:a", None, true, PolicyMode::Enforce)).unwrap();

    assert!(state.load(&ImageRef::new("app:a")).is_found());
    let StateLookup::NotFound(NotFoundReason::ImageMismatch { requested, recorded }) =
        state.load(&ImageRef::new("app:b"))
    else {
        panic!("expected image mismatch");
    };
    assert_eq!(requested, ImageRef::new("app:b"));
    assert_eq!(recorded, ImageRef::new("app:a"));
}

/// Tests a retagged image does not inherit the old digest's verdict.
#[test]
fn fallback_pointer_with_other_digest_is_not_found() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let audit = MemoryAuditSink::new();
    let before = StaticDigestResolver::new().with("app:latest", digest(DIGEST_A));
    VerificationStateStore::new(&layout, &before, &audit)
        .save(&record("app:latest", Some(DIGEST_A), true, PolicyMode::Enforce))
        .unwrap();
    fs::remove_file(layout.verify_record(&digest(DIGEST_A))).unwrap();

    let after = StaticDigestResolver::new().with("app:latest", digest(DIGEST_B));
    let state = VerificationStateStore::new(&layout, &after, &audit);
    assert!(matches!(
        state.load(&ImageRef::new("app:latest")),
        StateLookup::NotFound(NotFoundReason::DigestMismatch { .. })
    ));
}

/// Tests malformed and inconsistent files collapse to not found.
#[test]
fn unusable_state_is_not_found() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = resolver();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);

    let slot = layout.verify_record(&digest(DIGEST_A));
    fs::create_dir_all(slot.parent().unwrap()).unwrap();
    fs::write(&slot, "{\"imageRef\": ").unwrap();
    assert!(matches!(
        state.load(&ImageRef::new("app:a")),
        StateLookup::NotFound(NotFoundReason::Malformed(_))
    ));

    let mut forged = record("app:a", Some(DIGEST_A), false, PolicyMode::Enforce);
    forged.status = VerificationStatus::Pass;
    fs::write(&slot, serde_json::to_vec(&forged).unwrap()).unwrap();
    assert!(matches!(
        state.load(&ImageRef::new("app:a")),
        StateLookup::NotFound(NotFoundReason::Inconsistent(_))
    ));
    assert!(matches!(state.save(&forged), Err(StateError::Inconsistent(_))));
}

/// Tests sparse decision documents decode with empty defaults.
#[test]
fn sparse_record_decodes_defensively() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = resolver();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);
    let slot = layout.verify_record(&digest(DIGEST_A));
    fs::create_dir_all(slot.parent().unwrap()).unwrap();
    fs::write(&slot, r#"{"imageRef":"app:a","status":"fail","policyDecision":{"allow":false}}"#).unwrap();

    let record = state.load(&ImageRef::new("app:a")).into_record().unwrap();
    assert!(record.policy_decision.violations.is_empty());
    assert!(!record.sbom_present);
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Tests an image without history reports unknown with empty fields.
#[test]
fn unknown_report_has_explicit_empty_fields() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = resolver();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);
    let store = AttestationStore::new(&layout, &audit, &[]);
    let report = TrustStatusAggregator::new(&state, &store).status(&ImageRef::new("app:a"));

    assert_eq!(report.status, TrustStatus::Unknown);
    assert_eq!(report.exit_code(), 2);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "unknown");
    assert_eq!(json["schemaVersion"], "v0.2");
    assert_eq!(json["violations"], serde_json::json!([]));
    assert_eq!(json["warnings"], serde_json::json!([]));
    assert_eq!(json["attestations"], serde_json::json!([]));
    assert_eq!(json["sbomPresent"], false);
    assert_eq!(json["timestamp"], "");
}

/// Tests warn-mode failures report warn and exit 1.
#[test]
fn warn_mode_reports_warn() {
    let dir = tempfile::tempdir().expect("temp dir");
    let layout = TrustLayout::new(dir.path());
    let resolver = resolver();
    let audit = MemoryAuditSink::new();
    let state = VerificationStateStore::new(&layout, &resolver, &audit);
    state.save(&record("app:a", Some(DIGEST_A), false, PolicyMode::Warn)).unwrap();
    let store = AttestationStore::new(&layout, &audit, &[]);
    let report = TrustStatusAggregator::new(&state, &store).status(&ImageRef::new("app:a"));
    assert_eq!(report.status, TrustStatus::Warn);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.profile_used.as_deref(), Some("default"));
    assert_eq!(report.timestamp, "2024-05-01T12:00:00Z");
}
