// crates/acc-core/src/runtime/registry.rs
// ============================================================================
// Module: ACC Registry Client
// Description: OCI artifact push/pull of attestations through `oras`.
// Purpose: Implement RegistryClient over an external registry tool.
// Dependencies: crate::{core, interfaces, runtime::resolver}
// ============================================================================

//! ## Overview
//! Attestations are published as OCI artifacts tagged
//! `acc-attestation-<prefix12>`. The document and, when present, its detached
//! envelope travel in the same artifact. Pulls land in a caller-chosen
//! directory, which the attestation store places under the digest's
//! `remote/<registry>/<repo>/` subtree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

use crate::core::identifiers::ImageDigest;
use crate::interfaces::PublishRequest;
use crate::interfaces::RegistryClient;
use crate::interfaces::RegistryError;
use crate::interfaces::RemoteTarget;
use crate::runtime::resolver::find_in_path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tag prefix for attestation artifacts.
pub const ATTESTATION_TAG_PREFIX: &str = "acc-attestation-";
/// Default registry tool.
pub const DEFAULT_REGISTRY_TOOL: &str = "oras";
/// OCI artifact type for attestation documents.
const ARTIFACT_TYPE: &str = "application/vnd.acc.attestation.v1+json";
/// Media type of each artifact layer.
const LAYER_MEDIA_TYPE: &str = "application/json";

/// Returns the artifact tag for a digest.
#[must_use]
pub fn attestation_tag(digest: &ImageDigest) -> String {
    format!("{ATTESTATION_TAG_PREFIX}{}", digest.prefix())
}

// ============================================================================
// SECTION: Oras Client
// ============================================================================

/// Registry client that shells out to `oras`.
#[derive(Debug, Clone)]
pub struct OrasRegistryClient {
    /// Tool name or path.
    tool: String,
}

impl Default for OrasRegistryClient {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_TOOL)
    }
}

impl OrasRegistryClient {
    /// Creates a client that invokes `tool`.
    #[must_use]
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
        }
    }

    /// Runs the tool with `args` from `dir`.
    fn run(&self, dir: &Path, args: &[&str]) -> Result<Output, RegistryError> {
        let tool = find_in_path(&self.tool).ok_or_else(|| RegistryError::Unavailable(self.tool.clone()))?;
        let output = Command::new(tool)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| RegistryError::Failed(format!("{}: {err}", self.tool)))?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(RegistryError::Failed(format!("{} exited with {}: {}", self.tool, output.status, stderr.trim())))
        }
    }
}

impl RegistryClient for OrasRegistryClient {
    fn publish(&self, request: &PublishRequest) -> Result<String, RegistryError> {
        let dir = request.document.parent().unwrap_or_else(|| Path::new("."));
        let mut layers = vec![layer_arg(&request.document)?];
        if let Some(envelope) = &request.envelope {
            layers.push(layer_arg(envelope)?);
        }
        let reference = request.target.reference(&request.tag);
        let mut args = vec!["push", reference.as_str(), "--artifact-type", ARTIFACT_TYPE];
        args.extend(layers.iter().map(String::as_str));
        self.run(dir, &args)?;
        Ok(reference)
    }

    fn fetch(
        &self,
        target: &RemoteTarget,
        tag: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, RegistryError> {
        fs::create_dir_all(dest).map_err(|err| RegistryError::Failed(format!("{}: {err}", dest.display())))?;
        let reference = target.reference(tag);
        self.run(dest, &["pull", reference.as_str(), "--output", "."])?;
        let entries = fs::read_dir(dest).map_err(|err| RegistryError::Failed(format!("{}: {err}", dest.display())))?;
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Builds a `<file>:<media type>` layer argument relative to the document directory.
fn layer_arg(path: &Path) -> Result<String, RegistryError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RegistryError::Failed(format!("invalid artifact path {}", path.display())))?;
    Ok(format!("{name}:{LAYER_MEDIA_TYPE}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn tag_uses_digest_prefix() {
        let digest = ImageDigest::parse("sha256:abcdef0123456789abcdef").unwrap();
        assert_eq!(attestation_tag(&digest), "acc-attestation-abcdef012345");
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let client = OrasRegistryClient::new("acc-no-such-oras");
        let target = RemoteTarget::parse("registry.local/team/app").unwrap();
        let dir = std::env::temp_dir();
        let err = client.fetch(&target, "t", &dir).unwrap_err();
        assert_eq!(err, RegistryError::Unavailable("acc-no-such-oras".to_string()));
    }
}
