// crates/acc-core/src/core/identifiers.rs
// ============================================================================
// Module: ACC Identifiers
// Description: Typed image references and content digests.
// Purpose: Make digest normalization and validation a construction concern.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Image references are opaque strings supplied by operators. Image digests are
//! the authoritative identity for every isolation check, so [`ImageDigest`]
//! normalizes on construction (trim, lowercase, strip the algorithm prefix) and
//! rejects anything that is not hex. An empty digest cannot be represented,
//! which keeps digest-scoped lookups from ever widening to "all images".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of hex characters used for per-digest directory names.
pub const DIGEST_PREFIX_LEN: usize = 12;

// ============================================================================
// SECTION: Image Reference
// ============================================================================

/// Container image reference as supplied by the operator (`repo:tag`, `repo@sha256:..`).
///
/// # Invariants
/// - Opaque UTF-8 string; compared byte-for-byte with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates a new image reference.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the reference is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a filesystem-safe rendering of the reference.
    ///
    /// Every byte outside `[A-Za-z0-9._-]` becomes `_`, so the result never
    /// contains path separators.
    #[must_use]
    pub fn sanitized(&self) -> String {
        let mut out: String = self
            .0
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '_' }
            })
            .collect();
        if out.is_empty() || out.chars().all(|ch| ch == '.') {
            out = format!("ref_{out}");
        }
        out
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Image Digest
// ============================================================================

/// Errors raised when parsing a digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    /// Digest was empty after normalization.
    #[error("digest is empty")]
    Empty,
    /// Digest contained non-hex characters.
    #[error("digest is not hex: {0}")]
    NotHex(String),
    /// Digest is shorter than the directory prefix.
    #[error("digest too short: {0}")]
    TooShort(String),
}

/// Normalized content digest of an image.
///
/// # Invariants
/// - Lowercase hex, no algorithm prefix, at least [`DIGEST_PREFIX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ImageDigest(String);

impl ImageDigest {
    /// Parses and normalizes a raw digest string.
    ///
    /// # Errors
    ///
    /// Returns [`DigestParseError`] when the digest is empty, not hex, or too short.
    pub fn parse(raw: &str) -> Result<Self, DigestParseError> {
        let normalized = normalize_digest(raw);
        if normalized.is_empty() {
            return Err(DigestParseError::Empty);
        }
        if !normalized.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(DigestParseError::NotHex(normalized));
        }
        if normalized.len() < DIGEST_PREFIX_LEN {
            return Err(DigestParseError::TooShort(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory prefix (first [`DIGEST_PREFIX_LEN`] hex characters).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.0[.. DIGEST_PREFIX_LEN]
    }

    /// Returns true when an untrusted digest string names this digest.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        normalize_digest(candidate) == self.0
    }
}

impl<'de> Deserialize<'de> for ImageDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a digest string: trims, lowercases, and strips any `algo:` prefix.
#[must_use]
pub fn normalize_digest(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.rsplit_once(':') {
        Some((_, hex)) => hex.to_string(),
        None => lowered,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn digest_strips_prefix_and_lowercases() {
        let digest = ImageDigest::parse("  SHA256:ABCDEF0123456789abcdef  ").unwrap();
        assert_eq!(digest.as_str(), "abcdef0123456789abcdef");
        assert_eq!(digest.prefix(), "abcdef012345");
        assert!(digest.matches("sha256:abcdef0123456789ABCDEF"));
    }

    #[test]
    fn digest_rejects_empty_and_path_like_values() {
        assert_eq!(ImageDigest::parse("sha256:"), Err(DigestParseError::Empty));
        assert!(matches!(ImageDigest::parse("../../etc/passwd"), Err(DigestParseError::NotHex(_))));
        assert!(matches!(ImageDigest::parse("abc"), Err(DigestParseError::TooShort(_))));
    }

    #[test]
    fn sanitized_ref_has_no_separators() {
        let image = ImageRef::new("registry.local:5000/team/app:v1");
        assert_eq!(image.sanitized(), "registry.local_5000_team_app_v1");
        assert_eq!(ImageRef::new("..").sanitized(), "ref_..");
    }
}
