// crates/acc-core/src/runtime/mod.rs
// ============================================================================
// Module: ACC Runtime
// Description: Trust state, attestation forging, validation, and enforcement.
// Purpose: Implement the trust pipeline over the core types and interfaces.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules persist verification state, bind attestations to it, and
//! read both back for status reports and enforcement. `trust status`,
//! `trust verify`, `run`, and `push` all read through the same
//! [`VerificationStateStore`] and [`AttestationStore`], so every surface
//! sees the same decision for the same digest.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod attestations;
pub mod clock;
pub mod envelope;
pub mod forge;
pub mod gate;
pub mod layout;
pub mod registry;
pub mod resolver;
pub mod results_hash;
pub mod state;
pub mod status;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attestations::AttestationStore;
pub use attestations::AttestationValidation;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use envelope::EnvelopeError;
pub use forge::AttestOptions;
pub use forge::AttestationForge;
pub use forge::ForgeError;
pub use forge::ForgedAttestation;
pub use forge::PreparedAttestation;
pub use gate::EnforcementGate;
pub use gate::GateAction;
pub use gate::GateApproval;
pub use gate::GateDenial;
pub use layout::TrustLayout;
pub use registry::OrasRegistryClient;
pub use registry::attestation_tag;
pub use resolver::CommandDigestResolver;
pub use resolver::StaticDigestResolver;
pub use results_hash::CanonicalHasher;
pub use state::ImageMismatch;
pub use state::NotFoundReason;
pub use state::StateError;
pub use state::StateLookup;
pub use state::VerificationStateStore;
pub use status::RemoteSource;
pub use status::TrustStatusAggregator;
pub use status::TrustVerifyReport;
