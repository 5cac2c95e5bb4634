// crates/acc-core/src/lib.rs
// ============================================================================
// Module: ACC Core Library
// Description: Public API surface for the container trust core.
// Purpose: Expose trust types, capability interfaces, and runtime components.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! ACC gates running and pushing container images behind prior policy
//! verification and, optionally, attestations bound to that verification.
//! The crate turns an external policy decision into a digest-scoped record,
//! binds it to attestations with a canonical results hash, optionally signs
//! them with Ed25519, and reads everything back for status reports and
//! enforcement.
//! Invariants:
//! - A record's status is `pass` exactly when its decision allows.
//! - Lookups for one digest never return another digest's data.
//! - Attestations are valid only when schema, digest, and results hash hold.
//!
//! External tools (container runtimes, `oras`) sit behind [`DigestResolver`]
//! and [`RegistryClient`] so the core is testable without them.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::AttestationDocument;
pub use self::core::ImageDigest;
pub use self::core::ImageRef;
pub use self::core::PolicyDecision;
pub use self::core::PolicyMode;
pub use self::core::RecordInput;
pub use self::core::SignatureEnvelope;
pub use self::core::Timestamp;
pub use self::core::TrustStatus;
pub use self::core::TrustStatusReport;
pub use self::core::VerificationRecord;
pub use self::core::VerificationStatus;
pub use self::core::Violation;
pub use self::core::Waiver;
pub use audit::AuditOutcome;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::TrustAuditEvent;
pub use audit::TrustAuditSink;
pub use interfaces::Clock;
pub use interfaces::DigestError;
pub use interfaces::DigestResolver;
pub use interfaces::PublishRequest;
pub use interfaces::RegistryClient;
pub use interfaces::RegistryError;
pub use interfaces::RemoteTarget;
pub use runtime::AttestOptions;
pub use runtime::AttestationForge;
pub use runtime::AttestationStore;
pub use runtime::AttestationValidation;
pub use runtime::CanonicalHasher;
pub use runtime::EnforcementGate;
pub use runtime::ForgeError;
pub use runtime::GateAction;
pub use runtime::GateDenial;
pub use runtime::StateLookup;
pub use runtime::TrustLayout;
pub use runtime::TrustStatusAggregator;
pub use runtime::VerificationStateStore;
