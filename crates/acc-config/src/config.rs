// crates/acc-config/src/config.rs
// ============================================================================
// Module: ACC Configuration
// Description: Configuration loading and validation for the acc CLI.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: acc-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from `--config`, then `ACC_CONFIG`, then `.acc/acc.toml`.
//! An explicitly named file must exist; a missing default file yields the
//! built-in defaults. Unknown keys and inconsistent settings fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use acc_core::PolicyMode;
use acc_core::RemoteTarget;
use acc_core::runtime::forge::DEFAULT_POLICY_PACK;
use acc_core::runtime::layout::DEFAULT_ROOT;
use acc_core::runtime::registry::DEFAULT_REGISTRY_TOOL;
use acc_core::runtime::resolver::DEFAULT_DIGEST_TOOLS;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration path when no path is specified.
pub const DEFAULT_CONFIG_PATH: &str = ".acc/acc.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ACC_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of trusted signer key ids.
pub(crate) const MAX_TRUSTED_KEYS: usize = 64;
/// Maximum number of digest inspection tools.
pub(crate) const MAX_DIGEST_TOOLS: usize = 16;
/// Hex length of a signer key id.
const KEY_ID_HEX_LEN: usize = 64;
/// Default container runtime used by `run` and `push`.
const DEFAULT_CONTAINER_TOOL: &str = "docker";
/// Default SBOM directory.
const DEFAULT_SBOM_DIR: &str = ".acc/sbom";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level `acc.toml` configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccConfig {
    /// Trust state location.
    #[serde(default)]
    pub state: StateConfig,
    /// Policy pack settings recorded in attestations.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Gate enforcement settings.
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    /// Attestation signing and verification keys.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Remote attestation registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// External container tooling.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// SBOM discovery settings.
    #[serde(default)]
    pub sbom: SbomConfig,
    /// Audit sink selection.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Path the configuration was read from (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl AccConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = match fs::read(&resolved) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(err) => {
                return Err(ConfigError::Io(format!("{}: {err}", resolved.display())));
            }
        };
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.source = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.state.validate()?;
        self.policy.validate()?;
        self.signing.validate()?;
        self.registry.validate()?;
        self.runtime.validate()?;
        self.sbom.validate()?;
        self.audit.validate()
    }

    /// Returns the parsed registry target, when a repository is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the repository is malformed.
    pub fn registry_target(&self) -> Result<Option<RemoteTarget>, ConfigError> {
        self.registry
            .repository
            .as_deref()
            .map(|repository| {
                RemoteTarget::parse(repository)
                    .map_err(|err| ConfigError::Invalid(format!("registry.repository: {err}")))
            })
            .transpose()
    }
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// `[state]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Root directory for verification and attestation state.
    pub root: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
        }
    }
}

impl StateConfig {
    /// Validates state settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("state.root", &self.root.to_string_lossy())
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Policy pack recorded in attestation evidence.
    pub pack: String,
    /// Policy mode applied to new verification records.
    pub mode: PolicyMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pack: DEFAULT_POLICY_PACK.to_string(),
            mode: PolicyMode::Enforce,
        }
    }
}

impl PolicyConfig {
    /// Validates policy settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("policy.pack", &self.pack)
    }
}

/// `[enforcement]` section.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcementConfig {
    /// Require a fully valid attestation before `run` and `push`.
    pub require_attestation: bool,
}

/// `[signing]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    /// Ed25519 private key used by `acc attest --sign`.
    pub key_path: Option<PathBuf>,
    /// Signer key ids accepted by verifiers; empty accepts any valid signer.
    pub trusted_keys: Vec<String>,
}

impl SigningConfig {
    /// Validates signing settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.key_path {
            validate_path_string("signing.key_path", &path.to_string_lossy())?;
        }
        if self.trusted_keys.len() > MAX_TRUSTED_KEYS {
            return Err(ConfigError::Invalid("signing.trusted_keys exceeds limit".to_string()));
        }
        for key in &self.trusted_keys {
            let trimmed = key.trim();
            if trimmed.len() != KEY_ID_HEX_LEN || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit())
            {
                return Err(ConfigError::Invalid(format!(
                    "signing.trusted_keys entry is not a sha256 key id: {key}"
                )));
            }
        }
        Ok(())
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Push new attestations to the repository.
    pub publish: bool,
    /// Pull remote attestations before status and enforcement checks.
    pub fetch_remote: bool,
    /// Attestation repository as `registry/repo`.
    pub repository: Option<String>,
    /// Registry CLI tool.
    pub tool: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            publish: false,
            fetch_remote: false,
            repository: None,
            tool: DEFAULT_REGISTRY_TOOL.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Validates registry settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.trim().is_empty() {
            return Err(ConfigError::Invalid("registry.tool must be non-empty".to_string()));
        }
        match self.repository.as_deref() {
            Some(repository) => {
                RemoteTarget::parse(repository)
                    .map_err(|err| ConfigError::Invalid(format!("registry.repository: {err}")))?;
            }
            None if self.publish => {
                return Err(ConfigError::Invalid(
                    "registry.publish requires registry.repository".to_string(),
                ));
            }
            None if self.fetch_remote => {
                return Err(ConfigError::Invalid(
                    "registry.fetch_remote requires registry.repository".to_string(),
                ));
            }
            None => {}
        }
        Ok(())
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Tools probed, in order, to resolve image digests.
    pub digest_tools: Vec<String>,
    /// Container runtime invoked by `run` and `push`.
    pub container_tool: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            digest_tools: DEFAULT_DIGEST_TOOLS.iter().map(ToString::to_string).collect(),
            container_tool: DEFAULT_CONTAINER_TOOL.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Validates runtime settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.digest_tools.is_empty() {
            return Err(ConfigError::Invalid("runtime.digest_tools must be non-empty".to_string()));
        }
        if self.digest_tools.len() > MAX_DIGEST_TOOLS {
            return Err(ConfigError::Invalid("runtime.digest_tools exceeds limit".to_string()));
        }
        if self.digest_tools.iter().any(|tool| tool.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "runtime.digest_tools entries must be non-empty".to_string(),
            ));
        }
        if self.container_tool.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "runtime.container_tool must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[sbom]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SbomConfig {
    /// Directory searched for generated SBOMs.
    pub dir: PathBuf,
}

impl Default for SbomConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SBOM_DIR),
        }
    }
}

impl SbomConfig {
    /// Validates SBOM settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("sbom.dir", &self.dir.to_string_lossy())
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Audit events are discarded.
    #[serde(rename = "none")]
    Disabled,
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    pub sink: AuditSinkKind,
    /// Log file for the `file` sink.
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.sink = \"file\" requires audit.path".to_string()))
            }
            (_, Some(path)) => validate_path_string("audit.path", &path.to_string_lossy()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path and whether it was named explicitly.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR)
        && !env_path.trim().is_empty()
    {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_PATH), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn explicit_path_wins_over_default() {
        let (path, explicit) = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("custom.toml"));
        assert!(explicit);
    }

    #[test]
    fn long_path_components_are_rejected() {
        let long = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        assert!(validate_path(Path::new(&long)).is_err());
        assert!(validate_path_string("sbom.dir", &long).is_err());
        assert!(validate_path_string("sbom.dir", "  ").is_err());
    }
}
