// crates/acc-core/src/runtime/layout.rs
// ============================================================================
// Module: ACC Storage Layout
// Description: On-disk layout for state, pointers, and attestations.
// Purpose: Centralize path derivation and crash-tolerant file writes.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! All trust state lives under a single root (default `.acc`):
//!
//! ```text
//! state/last_verify.json              legacy global pointer
//! state/verify/<digest>.json          digest-scoped verification record
//! state/last_attestation.json         last attestation pointer
//! attestations/<prefix12>/local/      locally forged documents
//! attestations/<prefix12>/remote/<registry>/<repo>/  fetched documents
//! attestations/unresolved/<ref>/local/  documents for refs without a digest
//! ```
//!
//! Every path segment derived from input is either validated hex or
//! sanitized, so no input can escape the root. Superseding writes go through a
//! temporary sibling and rename; attestation writes use `create_new` and never
//! replace an existing file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::interfaces::RemoteTarget;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default trust root directory.
pub const DEFAULT_ROOT: &str = ".acc";
/// Maximum size of any state or attestation file read by the core.
pub const MAX_TRUST_FILE_BYTES: u64 = 4 * 1024 * 1024;
/// Directory for attestations whose subject digest was unresolved.
const UNRESOLVED_DIR: &str = "unresolved";
/// Suffix used for detached signature envelopes.
pub const ENVELOPE_SUFFIX: &str = ".sig.json";
/// Attempts made when allocating a unique file name.
const UNIQUE_ATTEMPTS: u32 = 64;

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Path derivation for the trust root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustLayout {
    /// Trust root directory.
    root: PathBuf,
}

impl Default for TrustLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl TrustLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Returns the legacy "last verification" pointer path.
    #[must_use]
    pub fn last_verify(&self) -> PathBuf {
        self.root.join("state").join("last_verify.json")
    }

    /// Returns the digest-scoped verification record path.
    #[must_use]
    pub fn verify_record(&self, digest: &ImageDigest) -> PathBuf {
        self.root.join("state").join("verify").join(format!("{digest}.json"))
    }

    /// Returns the "last attestation" pointer path.
    #[must_use]
    pub fn last_attestation(&self) -> PathBuf {
        self.root.join("state").join("last_attestation.json")
    }

    /// Returns the attestations root.
    #[must_use]
    pub fn attestations_root(&self) -> PathBuf {
        self.root.join("attestations")
    }

    /// Returns the per-digest attestation directory.
    #[must_use]
    pub fn digest_dir(&self, digest: &ImageDigest) -> PathBuf {
        self.attestations_root().join(digest.prefix())
    }

    /// Returns the local attestation directory for a digest.
    #[must_use]
    pub fn local_dir(&self, digest: &ImageDigest) -> PathBuf {
        self.digest_dir(digest).join("local")
    }

    /// Returns the local attestation directory for a ref whose digest is unknown.
    #[must_use]
    pub fn unresolved_dir(&self, image_ref: &ImageRef) -> PathBuf {
        self.attestations_root().join(UNRESOLVED_DIR).join(image_ref.sanitized()).join("local")
    }

    /// Returns the directory holding attestations fetched from a remote target.
    #[must_use]
    pub fn remote_dir(&self, digest: &ImageDigest, target: &RemoteTarget) -> PathBuf {
        let mut path = self.digest_dir(digest).join("remote").join(sanitize_segment(&target.registry));
        for segment in target.repository.split('/') {
            path.push(sanitize_segment(segment));
        }
        path
    }
}

/// Returns the detached envelope path for an attestation document.
#[must_use]
pub fn envelope_path(document: &Path) -> PathBuf {
    let stem = document.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    document.with_file_name(format!("{stem}{ENVELOPE_SUFFIX}"))
}

/// Returns true when a path names a detached envelope.
#[must_use]
pub fn is_envelope_path(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.ends_with(ENVELOPE_SUFFIX))
}

/// Replaces every byte outside `[A-Za-z0-9._-]` and neutralizes dot segments.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') { format!("_{cleaned}") } else { cleaned }
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Reads a file, refusing anything larger than [`MAX_TRUST_FILE_BYTES`].
///
/// # Errors
///
/// Returns the underlying I/O error, or [`ErrorKind::InvalidData`] when the file is too large.
pub fn read_limited(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    file.take(MAX_TRUST_FILE_BYTES + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > MAX_TRUST_FILE_BYTES {
        return Err(io::Error::new(ErrorKind::InvalidData, "trust file exceeds size limit"));
    }
    Ok(bytes)
}

/// Writes bytes through a temporary sibling and an atomic rename.
///
/// # Errors
///
/// Returns the underlying I/O error when the write or rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    replace_file(path, bytes, false)
}

/// Writes an owner-only file (mode `0o600` on unix).
///
/// The mode is applied at creation, so the contents are never readable by
/// other users. An existing file is replaced only when `replace` is set.
///
/// # Errors
///
/// Returns the underlying I/O error, or [`ErrorKind::AlreadyExists`] when the
/// path is taken and `replace` is false.
pub fn write_secret(path: &Path, bytes: &[u8], replace: bool) -> io::Result<()> {
    if replace {
        return replace_file(path, bytes, true);
    }
    write_new(path, bytes, true)
}

/// Creates a new file named `<stem>.json`, appending `-<n>` when taken.
///
/// Never replaces an existing file.
///
/// # Errors
///
/// Returns the underlying I/O error, or [`ErrorKind::AlreadyExists`] when no
/// free name is found.
pub fn create_unique(dir: &Path, stem: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    for attempt in 0 .. UNIQUE_ATTEMPTS {
        let name = if attempt == 0 { format!("{stem}.json") } else { format!("{stem}-{attempt}.json") };
        let path = dir.join(name);
        match create_exclusive(&path, bytes) {
            Ok(()) => return Ok(path),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(ErrorKind::AlreadyExists, "unable to allocate attestation file name"))
}

/// Writes `bytes` to a file that must not already exist.
///
/// # Errors
///
/// Returns [`ErrorKind::AlreadyExists`] when the path is taken, or the
/// underlying I/O error.
pub fn create_exclusive(path: &Path, bytes: &[u8]) -> io::Result<()> {
    write_new(path, bytes, false)
}

/// Writes through a temporary sibling, then renames over `path`.
fn replace_file(path: &Path, bytes: &[u8], private: bool) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?;
    for attempt in 0 .. UNIQUE_ATTEMPTS {
        let temp_path = parent.join(format!(".{file_name}.tmp.{}.{attempt}", std::process::id()));
        match open_new(&temp_path, private) {
            Ok(mut file) => {
                let written = file.write_all(bytes).and_then(|()| file.sync_all());
                if let Err(err) = written.and_then(|()| fs::rename(&temp_path, path)) {
                    let _ = fs::remove_file(&temp_path);
                    return Err(err);
                }
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(ErrorKind::AlreadyExists, "unable to allocate temporary file"))
}

/// Creates `path` exclusively, writes `bytes`, and syncs.
fn write_new(path: &Path, bytes: &[u8], private: bool) -> io::Result<()> {
    let mut file = open_new(path, private)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Opens a new file for writing, owner-only when `private` is set.
fn open_new(path: &Path, private: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;
    options.open(path)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;

    fn digest() -> ImageDigest {
        ImageDigest::parse("sha256:0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn digest_paths_use_prefix_and_full_digest() {
        let layout = TrustLayout::new("/trust");
        assert_eq!(layout.digest_dir(&digest()), PathBuf::from("/trust/attestations/0123456789ab"));
        assert_eq!(
            layout.verify_record(&digest()),
            PathBuf::from("/trust/state/verify/0123456789abcdef0123456789abcdef.json")
        );
    }

    #[test]
    fn remote_dir_cannot_escape_digest_dir() {
        let layout = TrustLayout::new("/trust");
        let target = RemoteTarget {
            registry: "..".to_string(),
            repository: "team/../app".to_string(),
        };
        let path = layout.remote_dir(&digest(), &target);
        assert!(path.starts_with(layout.digest_dir(&digest())));
        assert!(!path.components().any(|part| part.as_os_str() == ".."));
    }

    #[test]
    fn envelope_paths_sit_beside_documents() {
        let doc = Path::new("/a/local/20240101T000000.000000Z.json");
        let env = envelope_path(doc);
        assert_eq!(env, PathBuf::from("/a/local/20240101T000000.000000Z.sig.json"));
        assert!(is_envelope_path(&env));
        assert!(!is_envelope_path(doc));
    }

    #[test]
    fn create_unique_never_overwrites() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = create_unique(dir.path(), "stamp", b"one").unwrap();
        let second = create_unique(dir.path(), "stamp", b"two").unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read(first).unwrap(), b"one");
        assert_eq!(fs::read(second).unwrap(), b"two");
    }

    #[cfg(unix)]
    #[test]
    fn secrets_are_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("signing.key");
        write_secret(&path, b"first", false).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(write_secret(&path, b"second", false).unwrap_err().kind(), ErrorKind::AlreadyExists);

        write_secret(&path, b"second", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }
}
