// crates/acc-config/src/lib.rs
// ============================================================================
// Module: ACC Config Library
// Description: Canonical config model and validation for acc.toml.
// Purpose: Single source of truth for acc.toml semantics.
// Dependencies: acc-core, serde, toml
// ============================================================================

//! ## Overview
//! `acc-config` defines the configuration model for the `acc` CLI. It parses
//! `acc.toml` with strict, fail-closed validation and exposes typed accessors
//! for the values the trust core consumes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AccConfig;
pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_PATH;
pub use config::EnforcementConfig;
pub use config::PolicyConfig;
pub use config::RegistryConfig;
pub use config::RuntimeConfig;
pub use config::SbomConfig;
pub use config::SigningConfig;
pub use config::StateConfig;
