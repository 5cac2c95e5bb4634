// crates/acc-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: End-to-end runs of the acc binary against fake container tools.
// Purpose: Pin the exit-code contract and the verify/attest/gate workflow.
// Dependencies: acc binary, tempfile, serde_json
// ============================================================================

//! ## Overview
//! Each test builds a workspace with a config file and two shell scripts: a
//! digest inspector that knows `app:a` and `app:b`, and a container tool that
//! logs its arguments and exits with a configurable status. The `acc` binary
//! is then driven through `std::process::Command`.

#![cfg(unix)]
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
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const DIGEST_A: &str = "sha256:aaaaaaaaaaaa1111111111111111111111111111111111111111111111111111";
const DIGEST_B: &str = "sha256:bbbbbbbbbbbb2222222222222222222222222222222222222222222222222222";

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(require_attestation: bool) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        let inspect = root.join("bin/fake-inspect");
        write_script(
            &inspect,
            &format!(
                "#!/bin/sh\ncase \"$5\" in\n  app:a) echo \"{DIGEST_A}\" ;;\n  app:b) echo \
                 \"{DIGEST_B}\" ;;\n  *) echo \"no such image\" >&2; exit 1 ;;\nesac\n"
            ),
        );
        let container = root.join("bin/fake-docker");
        write_script(
            &container,
            &format!(
                "#!/bin/sh\necho \"$@\" >> '{log}'\nexit $(cat '{code}' 2>/dev/null || echo 0)\n",
                log = root.join("container.log").display(),
                code = root.join("container.exit").display(),
            ),
        );
        let config = root.join("acc.toml");
        fs::write(
            &config,
            format!(
                "[state]\nroot = '{state}'\n\n[enforcement]\nrequire_attestation = \
                 {require_attestation}\n\n[runtime]\ndigest_tools = ['{inspect}']\ncontainer_tool \
                 = '{container}'\n\n[sbom]\ndir = '{sbom}'\n\n[audit]\nsink = 'file'\npath = \
                 '{audit}'\n",
                state = root.join(".acc").display(),
                inspect = inspect.display(),
                container = container.display(),
                sbom = root.join("sbom").display(),
                audit = root.join("audit.log").display(),
            ),
        )
        .unwrap();
        Self {
            dir,
            config,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn acc(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_acc"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("ACC_CONFIG")
            .output()
            .expect("run acc")
    }

    fn decision(&self, allow: bool) -> String {
        let path = self.path(if allow { "allow.json" } else { "deny.json" });
        let body = if allow {
            r#"{"allow": true, "warnings": [{"rule": "tag-latest", "severity": "low", "message": "uses latest"}]}"#
        } else {
            r#"{"allow": false, "violations": [{"rule": "root-user", "severity": "high", "message": "runs as root"}]}"#
        };
        fs::write(&path, body).unwrap();
        path.display().to_string()
    }

    fn verify(&self, image: &str, allow: bool) -> Output {
        let decision = self.decision(allow);
        self.acc(&["verify", image, "--decision", &decision])
    }

    fn container_log(&self) -> String {
        fs::read_to_string(self.path("container.log")).unwrap_or_default()
    }

    fn attestation_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(&self.path(".acc/attestations"), &mut found);
        found
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("json output")
}

// ============================================================================
// SECTION: Verify and Status
// ============================================================================

/// Tests verify exit codes follow the recorded status.
#[test]
fn verify_exit_code_follows_decision() {
    let ws = Workspace::new(false);
    let pass = ws.verify("app:a", true);
    assert_eq!(pass.status.code(), Some(0), "{}", stderr(&pass));
    assert!(stdout(&pass).contains("Verification pass for app:a"));
    assert!(stdout(&pass).contains("tag-latest"));

    let fail = ws.verify("app:b", false);
    assert_eq!(fail.status.code(), Some(1));
    assert!(stdout(&fail).contains("root-user"));
    assert!(ws.path(".acc/state/verify/aaaaaaaaaaaa1111111111111111111111111111111111111111111111111111.json").is_file());
}

/// Tests status reports stay scoped to each image.
#[test]
fn trust_status_reports_per_image() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    ws.verify("app:b", false);

    let a = ws.acc(&["trust", "status", "app:a", "--json"]);
    assert_eq!(a.status.code(), Some(0));
    let report = json(&a);
    assert_eq!(report["status"], "pass");
    assert_eq!(report["warnings"][0]["rule"], "tag-latest");

    let b = ws.acc(&["trust", "status", "app:b", "--json"]);
    assert_eq!(b.status.code(), Some(1));
    assert_eq!(json(&b)["status"], "fail");
}

/// Tests an image without history is unknown with exit 2 and empty arrays.
#[test]
fn trust_status_unknown_exits_two() {
    let ws = Workspace::new(false);
    let output = ws.acc(&["trust", "status", "app:a", "--json"]);
    assert_eq!(output.status.code(), Some(2));
    let report = json(&output);
    assert_eq!(report["status"], "unknown");
    assert_eq!(report["violations"], Value::Array(Vec::new()));
    assert_eq!(report["attestations"], Value::Array(Vec::new()));
    assert_eq!(report["sbomPresent"], false);
    assert_eq!(report["timestamp"], "");

    let text = ws.acc(&["trust", "status", "app:a"]);
    assert!(stdout(&text).contains("run `acc verify app:a`"));
}

/// Tests an unresolvable image is recorded by reference.
#[test]
fn verify_without_digest_falls_back_to_reference() {
    let ws = Workspace::new(false);
    let output = ws.verify("local/app:dev", true);
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("recording by reference only"));
    let status = ws.acc(&["trust", "status", "local/app:dev", "--json"]);
    assert_eq!(json(&status)["status"], "pass");
    let other = ws.acc(&["trust", "status", "local/app:other"]);
    assert_eq!(other.status.code(), Some(2));
}

// ============================================================================
// SECTION: Attest
// ============================================================================

/// Tests attesting another image aborts before any message or file.
#[test]
fn attest_for_other_image_aborts_silently() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    let output = ws.acc(&["attest", "app:b"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout(&output).contains("Creating attestation"));
    assert!(stderr(&output).contains("acc verify app:b"));
    assert!(ws.attestation_files().is_empty());
}

/// Tests attesting without verification fails with remediation.
#[test]
fn attest_without_verification_fails() {
    let ws = Workspace::new(false);
    let output = ws.acc(&["attest", "app:a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!stdout(&output).contains("Creating attestation"));
    assert!(stderr(&output).contains("acc verify app:a"));
}

/// Tests attest then trust verify passes and re-verification invalidates.
#[test]
fn attest_then_trust_verify() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    let attest = ws.acc(&["attest", "app:a", "--git-commit", "abc123"]);
    assert_eq!(attest.status.code(), Some(0), "{}", stderr(&attest));
    let text = stdout(&attest);
    assert!(text.starts_with("Creating attestation for app:a (verification pass)..."));
    assert!(text.contains("Attestation written:"));

    let verify = ws.acc(&["trust", "verify", "app:a", "--json"]);
    assert_eq!(verify.status.code(), Some(0));
    assert_eq!(json(&verify)["attestations"][0]["resultsHashMatch"], true);

    ws.verify("app:a", false);
    let stale = ws.acc(&["trust", "verify", "app:a"]);
    assert_eq!(stale.status.code(), Some(1));
    assert!(stdout(&stale).contains("results hash mismatch"));
}

/// Tests the JSON document carries the evidence fields.
#[test]
fn attest_json_document_shape() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    let output = ws.acc(&["attest", "app:a", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let document = json(&output);
    assert_eq!(document["schemaVersion"], "v0.1");
    assert_eq!(document["subject"]["imageDigest"], DIGEST_A.trim_start_matches("sha256:"));
    assert_eq!(document["evidence"]["policyMode"], "enforce");
    assert_eq!(document["evidence"]["verificationStatus"], "pass");
    assert_eq!(document["metadata"]["tool"], "acc");
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Tests a failed verification blocks run before the container tool starts.
#[test]
fn failed_verification_blocks_run() {
    let ws = Workspace::new(false);
    ws.verify("app:a", false);
    let output = ws.acc(&["run", "app:a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("acc verify app:a"));
    assert!(ws.container_log().is_empty());
    let audit = fs::read_to_string(ws.path("audit.log")).unwrap();
    assert!(audit.contains("gate_decision"));
    assert!(audit.contains("verification_failed"));
}

/// Tests push requires verification.
#[test]
fn unverified_push_is_blocked() {
    let ws = Workspace::new(false);
    let output = ws.acc(&["push", "app:a"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("has not been verified"));
    assert!(ws.container_log().is_empty());
}

/// Tests run and push reach the container tool once trust checks pass.
#[test]
fn verified_image_runs_and_pushes() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    let run = ws.acc(&["run", "app:a", "--", "echo", "hi"]);
    assert_eq!(run.status.code(), Some(0), "{}", stderr(&run));
    let push = ws.acc(&["push", "app:a"]);
    assert_eq!(push.status.code(), Some(0));
    let log = ws.container_log();
    assert!(log.contains("run app:a echo hi"));
    assert!(log.contains("push app:a"));
}

/// Tests attestation enforcement blocks until an attestation exists.
#[test]
fn required_attestation_gates_run() {
    let ws = Workspace::new(true);
    ws.verify("app:a", true);
    let blocked = ws.acc(&["run", "app:a"]);
    assert_eq!(blocked.status.code(), Some(1));
    assert!(stderr(&blocked).contains("acc attest app:a"));

    assert_eq!(ws.acc(&["attest", "app:a"]).status.code(), Some(0));
    let allowed = ws.acc(&["run", "app:a"]);
    assert_eq!(allowed.status.code(), Some(0), "{}", stderr(&allowed));
}

/// Tests a container failure after approval is operational, not a denial.
#[test]
fn container_failure_after_allow_exits_two() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    fs::write(ws.path("container.exit"), "3").unwrap();
    let output = ws.acc(&["run", "app:a"]);
    assert_eq!(output.status.code(), Some(2));
    let message = stderr(&output);
    assert!(message.contains("Trust checks passed"));
    assert!(message.contains("was allowed but failed"));
    let audit = fs::read_to_string(ws.path("audit.log")).unwrap();
    let failure = audit.lines().find(|line| line.contains("\"container_failed\"")).expect("container audit");
    assert!(failure.contains("\"outcome\":\"error\""));
}

// ============================================================================
// SECTION: Keys and Config
// ============================================================================

/// Tests keygen output signs attestations that verify.
#[test]
fn keygen_keys_sign_attestations() {
    let ws = Workspace::new(false);
    let key = ws.path("keys/acc.key");
    let key_arg = key.display().to_string();
    let generated = ws.acc(&["keygen", "--out", &key_arg]);
    assert_eq!(generated.status.code(), Some(0), "{}", stderr(&generated));
    assert!(stdout(&generated).contains("Key id: "));
    assert!(ws.path("keys/acc.key.pub").is_file());
    let mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);

    let again = ws.acc(&["keygen", "--out", &key_arg]);
    assert_eq!(again.status.code(), Some(2));
    let forced = ws.acc(&["keygen", "--out", &key_arg, "--force"]);
    assert_eq!(forced.status.code(), Some(0), "{}", stderr(&forced));
    let mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);

    ws.verify("app:a", true);
    let attest = ws.acc(&["attest", "app:a", "--key", &key_arg]);
    assert_eq!(attest.status.code(), Some(0), "{}", stderr(&attest));
    assert!(stdout(&attest).contains("Signature: "));
    assert!(ws.attestation_files().iter().any(|path| path.to_string_lossy().ends_with(".sig.json")));

    let verify = ws.acc(&["trust", "verify", "app:a", "--json"]);
    assert_eq!(verify.status.code(), Some(0));
    assert_eq!(json(&verify)["attestations"][0]["signed"], true);
}

/// Tests --sign without a configured key fails before writing.
#[test]
fn sign_without_key_fails() {
    let ws = Workspace::new(false);
    ws.verify("app:a", true);
    let output = ws.acc(&["attest", "app:a", "--sign"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("signing.key_path"));
    assert!(ws.attestation_files().is_empty());
}

/// Tests missing and invalid config files fail closed.
#[test]
fn bad_config_exits_two() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing.toml");
    let output = Command::new(env!("CARGO_BIN_EXE_acc"))
        .arg("--config")
        .arg(&missing)
        .args(["trust", "status", "app:a"])
        .current_dir(dir.path())
        .output()
        .expect("run acc");
    assert_eq!(output.status.code(), Some(2));

    let from_env = Command::new(env!("CARGO_BIN_EXE_acc"))
        .args(["trust", "status", "app:a"])
        .env("ACC_CONFIG", &missing)
        .current_dir(dir.path())
        .output()
        .expect("run acc");
    assert_eq!(from_env.status.code(), Some(2));

    let invalid = dir.path().join("invalid.toml");
    fs::write(&invalid, "[registry]\npublish = true\n").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_acc"))
        .arg("--config")
        .arg(&invalid)
        .args(["trust", "status", "app:a"])
        .current_dir(dir.path())
        .output()
        .expect("run acc");
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("registry.repository"));
}
