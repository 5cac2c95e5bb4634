// crates/acc-core/src/interfaces/mod.rs
// ============================================================================
// Module: ACC Interfaces
// Description: Capability interfaces for digest lookup, registries, and time.
// Purpose: Keep the trust core free of process-spawning and clock concerns.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The trust core reaches the outside world only through these traits. Runtime
//! implementations shell out to installed tools; tests substitute fakes.
//! Implementations must fail closed: an unknown digest is an error, never a
//! guess.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Digest Resolution
// ============================================================================

/// Digest resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    /// No inspection tool is installed.
    #[error("no container inspection tool available (tried: {tried})")]
    NoToolAvailable {
        /// Comma-separated tool names that were probed.
        tried: String,
    },
    /// Tools ran but none produced a digest.
    #[error("unable to resolve digest for {image_ref}: {reason}")]
    Unresolved {
        /// Image reference that failed to resolve.
        image_ref: ImageRef,
        /// Last failure reason.
        reason: String,
    },
}

/// Resolves image references to content digests.
pub trait DigestResolver {
    /// Resolves an image reference to its normalized content digest.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] when no tool can produce a digest.
    fn resolve(&self, image_ref: &ImageRef) -> Result<ImageDigest, DigestError>;
}

impl<T: DigestResolver + ?Sized> DigestResolver for &T {
    fn resolve(&self, image_ref: &ImageRef) -> Result<ImageDigest, DigestError> {
        (**self).resolve(image_ref)
    }
}

// ============================================================================
// SECTION: Registry Client
// ============================================================================

/// Registry transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry tool is not installed.
    #[error("registry tool unavailable: {0}")]
    Unavailable(String),
    /// The registry operation failed.
    #[error("registry operation failed: {0}")]
    Failed(String),
    /// The remote target string is malformed.
    #[error("invalid registry target: {0}")]
    InvalidTarget(String),
}

/// Remote OCI repository that stores attestation artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Registry host (with optional port).
    pub registry: String,
    /// Repository path within the registry.
    pub repository: String,
}

impl RemoteTarget {
    /// Parses `registry/repo[/sub...]`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTarget`] when either part is missing or
    /// contains path traversal segments.
    pub fn parse(value: &str) -> Result<Self, RegistryError> {
        let trimmed = value.trim().trim_matches('/');
        let Some((registry, repository)) = trimmed.split_once('/') else {
            return Err(RegistryError::InvalidTarget(value.to_string()));
        };
        let bad_segment = |segment: &str| segment.is_empty() || segment == "." || segment == "..";
        if bad_segment(registry) || registry.ends_with(':') || repository.split('/').any(bad_segment)
        {
            return Err(RegistryError::InvalidTarget(value.to_string()));
        }
        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
        })
    }

    /// Returns the full artifact reference for a tag.
    #[must_use]
    pub fn reference(&self, tag: &str) -> String {
        format!("{}/{}:{tag}", self.registry, self.repository)
    }
}

/// Files pushed as one attestation artifact.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Destination repository.
    pub target: RemoteTarget,
    /// Artifact tag.
    pub tag: String,
    /// Attestation document path.
    pub document: PathBuf,
    /// Optional detached envelope path.
    pub envelope: Option<PathBuf>,
}

/// Registry client for attestation artifacts.
pub trait RegistryClient {
    /// Pushes an attestation artifact and returns the pushed reference.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the push fails.
    fn publish(&self, request: &PublishRequest) -> Result<String, RegistryError>;

    /// Pulls the artifact for `tag` into `dest` and returns the written files.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the pull fails.
    fn fetch(
        &self,
        target: &RemoteTarget,
        tag: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, RegistryError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
