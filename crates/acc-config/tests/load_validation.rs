// crates/acc-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Path resolution, limits, and cross-section consistency.
// Purpose: Ensure acc.toml parsing fails closed on bad input.
// Dependencies: acc-config, tempfile
// ============================================================================

//! ## Overview
//! Loads configuration files from temporary directories and checks defaults,
//! strict key handling, and the consistency rules enforced by `validate`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and fixtures."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use acc_config::AccConfig;
use acc_config::AuditSinkKind;
use acc_config::ConfigError;
use acc_core::PolicyMode;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("acc.toml");
    fs::write(&path, content).expect("write config");
    path
}

fn invalid_message(content: &str) -> String {
    match AccConfig::parse(content) {
        Err(ConfigError::Invalid(message)) => message,
        other => panic!("expected invalid config, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests an empty file yields the documented defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = AccConfig::parse("").unwrap();
    assert_eq!(config.state.root, PathBuf::from(".acc"));
    assert_eq!(config.policy.pack, ".acc/policy");
    assert_eq!(config.policy.mode, PolicyMode::Enforce);
    assert!(!config.enforcement.require_attestation);
    assert_eq!(config.registry.tool, "oras");
    assert_eq!(config.runtime.digest_tools, vec!["docker", "podman", "nerdctl"]);
    assert_eq!(config.runtime.container_tool, "docker");
    assert_eq!(config.sbom.dir, PathBuf::from(".acc/sbom"));
    assert_eq!(config.audit.sink, AuditSinkKind::Stderr);
    assert!(config.registry_target().unwrap().is_none());
}

/// Tests a full file loads from disk and records its source.
#[test]
fn full_config_loads_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(
        dir.path(),
        r#"
[state]
root = "trust"

[policy]
pack = "packs/baseline"
mode = "warn"

[enforcement]
require_attestation = true

[signing]
key_path = "keys/acc.key"
trusted_keys = ["0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"]

[registry]
publish = true
fetch_remote = true
repository = "registry.example.com/team/attestations"

[runtime]
digest_tools = ["podman"]
container_tool = "podman"

[sbom]
dir = "out/sbom"

[audit]
sink = "none"
"#,
    );
    let config = AccConfig::load(Some(&path)).unwrap();
    assert_eq!(config.source.as_deref(), Some(path.as_path()));
    assert_eq!(config.policy.mode, PolicyMode::Warn);
    assert!(config.enforcement.require_attestation);
    assert_eq!(config.signing.trusted_keys.len(), 1);
    assert_eq!(config.audit.sink, AuditSinkKind::Disabled);
    let target = config.registry_target().unwrap().unwrap();
    assert_eq!(target.registry, "registry.example.com");
    assert_eq!(target.repository, "team/attestations");
}

/// Tests a missing explicitly named file is an error.
#[test]
fn missing_explicit_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    assert!(matches!(AccConfig::load(Some(&missing)), Err(ConfigError::Io(_))));
}

/// Tests unknown keys are rejected at every level.
#[test]
fn unknown_keys_are_rejected() {
    assert!(matches!(AccConfig::parse("[unknown]\nvalue = 1\n"), Err(ConfigError::Parse(_))));
    assert!(matches!(AccConfig::parse("[policy]\nstrict = true\n"), Err(ConfigError::Parse(_))));
    assert!(matches!(AccConfig::parse("[policy]\nmode = \"audit\"\n"), Err(ConfigError::Parse(_))));
}

/// Tests oversized and non-utf8 files fail closed.
#[test]
fn size_and_encoding_limits_apply() {
    let dir = tempfile::tempdir().expect("temp dir");
    let big = dir.path().join("big.toml");
    fs::write(&big, format!("# {}\n", "x".repeat(1024 * 1024))).unwrap();
    assert!(matches!(AccConfig::load(Some(&big)), Err(ConfigError::Invalid(_))));

    let binary = dir.path().join("binary.toml");
    fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
    let Err(ConfigError::Invalid(message)) = AccConfig::load(Some(&binary)) else {
        panic!("expected utf-8 rejection");
    };
    assert!(message.contains("utf-8"));
}

/// Tests registry features require a repository.
#[test]
fn registry_features_require_repository() {
    assert!(invalid_message("[registry]\npublish = true\n").contains("registry.repository"));
    assert!(invalid_message("[registry]\nfetch_remote = true\n").contains("registry.repository"));
    assert!(invalid_message("[registry]\nrepository = \"no-slash\"\n").contains("registry.repository"));
    assert!(invalid_message("[registry]\nrepository = \"host/../x\"\n").contains("registry.repository"));
}

/// Tests a file audit sink requires a path.
#[test]
fn file_audit_sink_requires_path() {
    assert!(invalid_message("[audit]\nsink = \"file\"\n").contains("audit.path"));
    let config = AccConfig::parse("[audit]\nsink = \"file\"\npath = \"audit.log\"\n").unwrap();
    assert_eq!(config.audit.sink, AuditSinkKind::File);
}

/// Tests tool lists and key ids are validated.
#[test]
fn tools_and_keys_are_validated() {
    assert!(invalid_message("[runtime]\ndigest_tools = []\n").contains("digest_tools"));
    assert!(invalid_message("[runtime]\ncontainer_tool = \" \"\n").contains("container_tool"));
    assert!(invalid_message("[signing]\ntrusted_keys = [\"abc\"]\n").contains("trusted_keys"));
}
