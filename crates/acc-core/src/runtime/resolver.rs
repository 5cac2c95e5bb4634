// crates/acc-core/src/runtime/resolver.rs
// ============================================================================
// Module: ACC Digest Resolvers
// Description: Image digest lookup via installed container runtimes.
// Purpose: Implement DigestResolver over external inspection tools.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`CommandDigestResolver`] probes a fixed, ordered list of container tools
//! (default `docker`, `podman`, `nerdctl`) and returns the first non-empty
//! digest any of them reports. It caches nothing: every call re-inspects, so
//! results follow retagging. [`StaticDigestResolver`] is a fixed map used in
//! tests and by hosts that already know their digests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;

use crate::core::identifiers::ImageDigest;
use crate::core::identifiers::ImageRef;
use crate::interfaces::DigestError;
use crate::interfaces::DigestResolver;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default inspection tools in priority order.
pub const DEFAULT_DIGEST_TOOLS: [&str; 3] = ["docker", "podman", "nerdctl"];
/// Go template selecting the image identifier.
const INSPECT_FORMAT: &str = "{{.Id}}";

// ============================================================================
// SECTION: Command Resolver
// ============================================================================

/// Resolves digests by invoking `<tool> image inspect`.
#[derive(Debug, Clone)]
pub struct CommandDigestResolver {
    /// Tools in priority order.
    tools: Vec<String>,
}

impl Default for CommandDigestResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DIGEST_TOOLS.iter().map(ToString::to_string).collect())
    }
}

impl CommandDigestResolver {
    /// Creates a resolver that probes `tools` in order.
    #[must_use]
    pub const fn new(tools: Vec<String>) -> Self {
        Self {
            tools,
        }
    }

    /// Returns the installed tools, preserving priority order.
    #[must_use]
    pub fn available_tools(&self) -> Vec<PathBuf> {
        self.tools.iter().filter_map(|tool| find_in_path(tool)).collect()
    }
}

impl DigestResolver for CommandDigestResolver {
    fn resolve(&self, image_ref: &ImageRef) -> Result<ImageDigest, DigestError> {
        let installed = self.available_tools();
        if installed.is_empty() {
            return Err(DigestError::NoToolAvailable {
                tried: self.tools.join(", "),
            });
        }
        let mut last_reason = String::from("no tool returned a digest");
        for tool in installed {
            let output = Command::new(&tool)
                .args(["image", "inspect", "--format", INSPECT_FORMAT, image_ref.as_str()])
                .stdin(Stdio::null())
                .output();
            match output {
                Ok(output) if output.status.success() => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let first = stdout.lines().map(str::trim).find(|line| !line.is_empty());
                    match first.map(ImageDigest::parse) {
                        Some(Ok(digest)) => return Ok(digest),
                        Some(Err(err)) => last_reason = format!("{}: {err}", tool.display()),
                        None => last_reason = format!("{}: empty output", tool.display()),
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    last_reason = format!("{}: {}", tool.display(), stderr.trim());
                }
                Err(err) => last_reason = format!("{}: {err}", tool.display()),
            }
        }
        Err(DigestError::Unresolved {
            image_ref: image_ref.clone(),
            reason: last_reason,
        })
    }
}

/// Locates an executable on `PATH`.
#[must_use]
pub fn find_in_path(tool: &str) -> Option<PathBuf> {
    if tool.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(tool);
        return path.is_file().then_some(path);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).map(|dir| dir.join(tool)).find(|candidate| candidate.is_file())
}

// ============================================================================
// SECTION: Static Resolver
// ============================================================================

/// Fixed reference-to-digest map.
#[derive(Debug, Clone, Default)]
pub struct StaticDigestResolver {
    /// Known digests keyed by reference string.
    digests: BTreeMap<String, ImageDigest>,
}

impl StaticDigestResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mapping.
    #[must_use]
    pub fn with(mut self, image_ref: &str, digest: ImageDigest) -> Self {
        self.digests.insert(ImageRef::new(image_ref).as_str().to_string(), digest);
        self
    }
}

impl DigestResolver for StaticDigestResolver {
    fn resolve(&self, image_ref: &ImageRef) -> Result<ImageDigest, DigestError> {
        self.digests.get(image_ref.as_str()).cloned().ok_or_else(|| DigestError::Unresolved {
            image_ref: image_ref.clone(),
            reason: "image not known".to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
