// crates/acc-cli/src/main.rs
// ============================================================================
// Module: ACC CLI Entry Point
// Description: Command dispatcher for verification, attestation, and gating.
// Purpose: Map trust-core outcomes onto the stable 0/1/2 exit-code contract.
// Dependencies: acc-config, acc-core, clap, ed25519-dalek, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `acc` is a thin dispatcher over the trust core:
//!
//! - `verify` records a policy engine decision for an image.
//! - `attest` binds the current record to a new attestation document.
//! - `trust status` / `trust verify` report on recorded state.
//! - `run` / `push` consult the enforcement gate before calling the container
//!   runtime.
//! - `keygen` writes an Ed25519 signing key pair.
//!
//! Exit codes: 0 pass, 1 fail or blocked, 2 unknown or unable to complete.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod container;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use acc_config::AccConfig;
use acc_config::AuditSinkKind;
use acc_core::AttestOptions;
use acc_core::AttestationForge;
use acc_core::AttestationStore;
use acc_core::AuditOutcome;
use acc_core::Clock;
use acc_core::DigestResolver;
use acc_core::EnforcementGate;
use acc_core::FileAuditSink;
use acc_core::ForgeError;
use acc_core::GateAction;
use acc_core::ImageRef;
use acc_core::NoopAuditSink;
use acc_core::PolicyDecision;
use acc_core::RecordInput;
use acc_core::RemoteTarget;
use acc_core::StderrAuditSink;
use acc_core::TrustAuditEvent;
use acc_core::TrustAuditSink;
use acc_core::TrustLayout;
use acc_core::TrustStatus;
use acc_core::TrustStatusAggregator;
use acc_core::TrustStatusReport;
use acc_core::VerificationRecord;
use acc_core::VerificationStateStore;
use acc_core::Violation;
use acc_core::Waiver;
use acc_core::core::EXIT_FAIL;
use acc_core::core::EXIT_UNKNOWN;
use acc_core::runtime::CommandDigestResolver;
use acc_core::runtime::OrasRegistryClient;
use acc_core::runtime::RemoteSource;
use acc_core::runtime::SystemClock;
use acc_core::runtime::TrustVerifyReport;
use acc_core::runtime::envelope;
use acc_core::runtime::forge::find_sbom;
use acc_core::runtime::layout::create_exclusive;
use acc_core::runtime::layout::read_limited;
use acc_core::runtime::layout::write_atomic;
use acc_core::runtime::layout::write_secret;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "acc", version, about = "Container trust gate", disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `ACC_CONFIG`, then .acc/acc.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a policy decision for an image.
    Verify(VerifyCommand),
    /// Create an attestation bound to the current verification.
    Attest(AttestCommand),
    /// Trust reporting utilities.
    Trust {
        /// Selected trust subcommand.
        #[command(subcommand)]
        command: TrustCommand,
    },
    /// Run a container after trust checks pass.
    Run(RunCommand),
    /// Push an image after trust checks pass.
    Push(PushCommand),
    /// Generate an Ed25519 signing key pair.
    Keygen(KeygenCommand),
}

/// Trust subcommands.
#[derive(Subcommand, Debug)]
enum TrustCommand {
    /// Summarize verification and attestation state.
    Status(TrustQuery),
    /// Validate attestations against the current verification.
    Verify(TrustQuery),
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Image reference.
    image: String,
    /// Policy decision JSON (`{allow, violations, warnings}`).
    #[arg(long, value_name = "FILE")]
    decision: PathBuf,
    /// Waivers JSON array applied during evaluation.
    #[arg(long, value_name = "FILE")]
    waivers: Option<PathBuf>,
    /// Verification profile name.
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,
    /// Emit the stored record as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments for `attest`.
#[derive(Args, Debug)]
struct AttestCommand {
    /// Image reference.
    image: String,
    /// Sign with `signing.key_path`.
    #[arg(long)]
    sign: bool,
    /// Private key file; implies signing.
    #[arg(long, value_name = "PATH")]
    key: Option<PathBuf>,
    /// Publish to `registry.repository`.
    #[arg(long)]
    publish: bool,
    /// Source commit recorded in metadata.
    #[arg(long, value_name = "SHA")]
    git_commit: Option<String>,
    /// Emit the attestation document as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments shared by the trust subcommands.
#[derive(Args, Debug)]
struct TrustQuery {
    /// Image reference.
    image: String,
    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Image reference.
    image: String,
    /// Arguments passed to the container after the image.
    #[arg(last = true)]
    args: Vec<String>,
}

/// Arguments for `push`.
#[derive(Args, Debug)]
struct PushCommand {
    /// Image reference.
    image: String,
}

/// Arguments for `keygen`.
#[derive(Args, Debug)]
struct KeygenCommand {
    /// Private key output path; the public key is written to `<PATH>.pub`.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
    /// Replace existing key files.
    #[arg(long)]
    force: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying its exit code.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
    /// Process exit code.
    exit: u8,
}

impl CliError {
    /// Builds an error with an explicit exit code.
    fn new(message: impl Into<String>, exit: u8) -> Self {
        Self {
            message: message.into(),
            exit,
        }
    }

    /// Builds an error for a command that could not complete.
    fn incomplete(message: impl Into<String>) -> Self {
        Self::new(message, EXIT_UNKNOWN)
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if let Commands::Keygen(command) = &cli.command {
        return command_keygen(command);
    }
    let ctx = Context::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Verify(command) => command_verify(&ctx, &command),
        Commands::Attest(command) => command_attest(&ctx, command),
        Commands::Trust {
            command: TrustCommand::Status(query),
        } => command_trust_status(&ctx, &query),
        Commands::Trust {
            command: TrustCommand::Verify(query),
        } => command_trust_verify(&ctx, &query),
        Commands::Run(command) => command_gate(&ctx, GateAction::Run, &command.image, &command.args),
        Commands::Push(command) => command_gate(&ctx, GateAction::Push, &command.image, &[]),
        Commands::Keygen(command) => command_keygen(&command),
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Runtime wiring derived from configuration.
struct Context {
    /// Loaded configuration.
    config: AccConfig,
    /// Trust state layout.
    layout: TrustLayout,
    /// Digest resolver over the configured inspection tools.
    resolver: CommandDigestResolver,
    /// Audit sink.
    audit: Box<dyn TrustAuditSink>,
    /// Registry client.
    registry: OrasRegistryClient,
    /// Configured attestation repository.
    target: Option<RemoteTarget>,
}

impl Context {
    /// Loads configuration and builds the runtime collaborators.
    fn load(path: Option<&Path>) -> CliResult<Self> {
        let config = AccConfig::load(path).map_err(|err| CliError::incomplete(err.to_string()))?;
        let target = config.registry_target().map_err(|err| CliError::incomplete(err.to_string()))?;
        let audit: Box<dyn TrustAuditSink> = match (config.audit.sink, &config.audit.path) {
            (AuditSinkKind::File, Some(path)) => Box::new(FileAuditSink::new(path).map_err(|err| {
                CliError::incomplete(format!("failed to open audit log {}: {err}", path.display()))
            })?),
            (AuditSinkKind::Disabled, _) => Box::new(NoopAuditSink),
            _ => Box::new(StderrAuditSink),
        };
        Ok(Self {
            layout: TrustLayout::new(&config.state.root),
            resolver: CommandDigestResolver::new(config.runtime.digest_tools.clone()),
            registry: OrasRegistryClient::new(config.registry.tool.clone()),
            audit,
            target,
            config,
        })
    }

    /// Returns the verification state store.
    fn state(&self) -> VerificationStateStore<'_> {
        VerificationStateStore::new(&self.layout, &self.resolver, self.audit.as_ref())
    }

    /// Returns the attestation store.
    fn attestations(&self) -> AttestationStore<'_> {
        AttestationStore::new(&self.layout, self.audit.as_ref(), &self.config.signing.trusted_keys)
    }

    /// Returns the remote source when remote fetching is enabled.
    fn remote(&self) -> Option<RemoteSource<'_>> {
        if !self.config.registry.fetch_remote {
            return None;
        }
        self.target.as_ref().map(|target| RemoteSource {
            client: &self.registry,
            target,
        })
    }
}

// ============================================================================
// SECTION: Verify Command
// ============================================================================

/// Executes `verify`.
fn command_verify(ctx: &Context, command: &VerifyCommand) -> CliResult<ExitCode> {
    let image_ref = parse_image(&command.image)?;
    let decision: PolicyDecision = read_json(&command.decision)?;
    let waivers: Vec<Waiver> = match &command.waivers {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let digest = match ctx.resolver.resolve(&image_ref) {
        Ok(digest) => Some(digest),
        Err(err) => {
            write_stderr(&format!("warning: {err}; recording by reference only"));
            None
        }
    };
    let timestamp = SystemClock.now().to_rfc3339().map_err(|err| CliError::incomplete(err.to_string()))?;
    let record = VerificationRecord::from_decision(RecordInput {
        sbom_present: find_sbom(&ctx.config.sbom.dir, &image_ref, digest.as_ref()).is_some(),
        image_ref,
        image_digest: digest,
        decision,
        mode: ctx.config.policy.mode,
        profile_used: command.profile.clone(),
        waivers,
        timestamp,
    });
    let path = ctx
        .state()
        .save(&record)
        .map_err(|err| CliError::incomplete(format!("failed to save verification: {err}")))?;

    if command.json {
        write_json(&record)?;
    } else {
        let mut out = format!("Verification {} for {}", record.status, record.image_ref);
        if !record.image_digest.is_empty() {
            out.push_str(&format!(" (sha256:{})", record.image_digest));
        }
        push_findings(&mut out, "Violations", &record.policy_decision.violations);
        push_findings(&mut out, "Warnings", &record.policy_decision.warnings);
        out.push_str(&format!("\nRecord: {}", path.display()));
        write_stdout(&out)?;
    }
    Ok(ExitCode::from(TrustStatus::from(record.status).exit_code()))
}

// ============================================================================
// SECTION: Attest Command
// ============================================================================

/// Executes `attest`.
fn command_attest(ctx: &Context, command: AttestCommand) -> CliResult<ExitCode> {
    let image_ref = parse_image(&command.image)?;
    let key_path = match (command.key, command.sign) {
        (Some(path), _) => Some(path),
        (None, true) => Some(ctx.config.signing.key_path.clone().ok_or_else(|| {
            CliError::incomplete("--sign requires --key or signing.key_path in config")
        })?),
        (None, false) => None,
    };
    let signing_key = key_path
        .map(|path| {
            envelope::load_signing_key(&path).map_err(|err| {
                CliError::incomplete(format!("failed to load signing key {}: {err}", path.display()))
            })
        })
        .transpose()?;
    let publish = if command.publish || ctx.config.registry.publish {
        Some(ctx.target.clone().ok_or_else(|| {
            CliError::incomplete("publishing requires registry.repository in config")
        })?)
    } else {
        None
    };
    let options = AttestOptions {
        policy_pack: ctx.config.policy.pack.clone(),
        policy_mode: ctx.config.policy.mode,
        sbom_dir: ctx.config.sbom.dir.clone(),
        git_commit: command.git_commit.unwrap_or_default(),
        signing_key,
        publish,
        ..AttestOptions::default()
    };

    let state = ctx.state();
    let clock = SystemClock;
    let mut forge = AttestationForge::new(&ctx.layout, &state, &clock, ctx.audit.as_ref());
    if options.publish.is_some() {
        forge = forge.with_registry(&ctx.registry);
    }
    let prepared = forge.prepare(&image_ref, &options).map_err(forge_error)?;
    if !command.json {
        let status = prepared.document().evidence.verification_status;
        write_stdout(&format!("Creating attestation for {image_ref} (verification {status})..."))?;
    }
    let forged = prepared.write().map_err(forge_error)?;
    if let Some(err) = &forged.publish_error {
        write_stderr(&format!("warning: attestation publish failed: {err}"));
    }

    if command.json {
        write_json(&forged.document)?;
    } else {
        let mut out = format!("Attestation written: {}", forged.path.display());
        if let Some(envelope) = &forged.envelope {
            out.push_str(&format!("\nSignature: {}", envelope.display()));
        }
        if let Some(reference) = &forged.published {
            out.push_str(&format!("\nPublished: {reference}"));
        }
        write_stdout(&out)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Maps forge failures onto exit codes.
fn forge_error(err: ForgeError) -> CliError {
    let exit = match &err {
        ForgeError::NoVerificationState {
            ..
        }
        | ForgeError::ImageMismatch(_) => EXIT_FAIL,
        _ => EXIT_UNKNOWN,
    };
    CliError::new(err.to_string(), exit)
}

// ============================================================================
// SECTION: Trust Commands
// ============================================================================

/// Executes `trust status`.
fn command_trust_status(ctx: &Context, query: &TrustQuery) -> CliResult<ExitCode> {
    let image_ref = parse_image(&query.image)?;
    let state = ctx.state();
    let store = ctx.attestations();
    let mut aggregator = TrustStatusAggregator::new(&state, &store);
    if let Some(remote) = ctx.remote() {
        aggregator = aggregator.with_remote(remote);
    }
    let report = aggregator.status(&image_ref);
    if query.json {
        write_json(&report)?;
    } else {
        write_stdout(&render_status(&report))?;
    }
    Ok(ExitCode::from(report.exit_code()))
}

/// Executes `trust verify`.
fn command_trust_verify(ctx: &Context, query: &TrustQuery) -> CliResult<ExitCode> {
    let image_ref = parse_image(&query.image)?;
    let state = ctx.state();
    let store = ctx.attestations();
    let mut aggregator = TrustStatusAggregator::new(&state, &store);
    if let Some(remote) = ctx.remote() {
        aggregator = aggregator.with_remote(remote);
    }
    let report = aggregator.verify(&image_ref);
    if query.json {
        write_json(&report)?;
    } else {
        write_stdout(&render_verify(&report))?;
    }
    Ok(ExitCode::from(report.exit_code()))
}

/// Renders a status report as text.
fn render_status(report: &TrustStatusReport) -> String {
    let mut out = format!("Trust status for {}: {}", report.image_ref, report.status);
    if report.status == TrustStatus::Unknown {
        out.push_str(&format!("\nNo verification state; run `acc verify {}`", report.image_ref));
        return out;
    }
    if let Some(profile) = &report.profile_used {
        out.push_str(&format!("\nProfile: {profile}"));
    }
    out.push_str(&format!("\nVerified at: {}", report.timestamp));
    push_findings(&mut out, "Violations", &report.violations);
    push_findings(&mut out, "Warnings", &report.warnings);
    out.push_str(&format!("\nSBOM: {}", if report.sbom_present { "present" } else { "absent" }));
    out.push_str(&format!("\nAttestations: {}", report.attestations.len()));
    for path in &report.attestations {
        out.push_str(&format!("\n  {path}"));
    }
    out
}

/// Renders an attestation verification report as text.
fn render_verify(report: &TrustVerifyReport) -> String {
    let mut out = format!("Attestation verification for {}: {}", report.image_ref, report.status);
    if report.status == TrustStatus::Unknown {
        out.push_str(&format!("\nNo verification state; run `acc verify {}`", report.image_ref));
        return out;
    }
    if report.attestations.is_empty() {
        out.push_str(&format!("\nNo attestations found; run `acc attest {}`", report.image_ref));
    }
    for result in &report.attestations {
        let verdict = if result.is_valid() { "valid" } else { "invalid" };
        out.push_str(&format!("\n  {} [{verdict}", result.path.display()));
        if result.signed {
            out.push_str(", signed");
        }
        out.push(']');
        if let Some(reason) = &result.invalid_reason {
            out.push_str(&format!(": {reason}"));
        }
    }
    out
}

// ============================================================================
// SECTION: Gate Commands
// ============================================================================

/// Executes `run` or `push` behind the enforcement gate.
fn command_gate(
    ctx: &Context,
    action: GateAction,
    image: &str,
    extra: &[String],
) -> CliResult<ExitCode> {
    let image_ref = parse_image(image)?;
    let state = ctx.state();
    let store = ctx.attestations();
    let mut gate = EnforcementGate::new(
        &state,
        &store,
        ctx.audit.as_ref(),
        ctx.config.enforcement.require_attestation,
    );
    if let Some(remote) = ctx.remote() {
        gate = gate.with_remote(remote);
    }
    let approval = gate
        .check(action, &image_ref)
        .map_err(|denial| CliError::new(format!("blocked: {denial}"), denial.exit_code()))?;
    write_stderr(&format!(
        "Trust checks passed for {image_ref} (verification {})",
        approval.record.status
    ));
    if let Err(err) = container::invoke(&ctx.config.runtime.container_tool, action, &image_ref, extra)
    {
        ctx.audit.record(
            &TrustAuditEvent::new("container_failed", AuditOutcome::Error)
                .image(&image_ref)
                .reason(&err),
        );
        return Err(CliError::incomplete(format!(
            "{action} of {image_ref} was allowed but failed: {err}"
        )));
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Keygen Command
// ============================================================================

/// Executes `keygen`.
fn command_keygen(command: &KeygenCommand) -> CliResult<ExitCode> {
    let key = SigningKey::generate(&mut OsRng);
    let verifying = key.verifying_key();
    let mut public_path = command.out.clone().into_os_string();
    public_path.push(".pub");
    let public_path = PathBuf::from(public_path);

    write_key_file(&command.out, Base64.encode(key.to_bytes()).as_bytes(), command.force, true)?;
    write_key_file(&public_path, Base64.encode(verifying.as_bytes()).as_bytes(), command.force, false)?;
    write_stdout(&format!(
        "Private key: {}\nPublic key: {}\nKey id: {}",
        command.out.display(),
        public_path.display(),
        envelope::key_id(&verifying)
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes a key file, refusing to replace one unless forced.
///
/// Private keys are created owner-only.
fn write_key_file(path: &Path, bytes: &[u8], force: bool, private: bool) -> CliResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| {
            CliError::incomplete(format!("failed to create {}: {err}", parent.display()))
        })?;
    }
    let result = match (private, force) {
        (true, _) => write_secret(path, bytes, force),
        (false, true) => write_atomic(path, bytes),
        (false, false) => create_exclusive(path, bytes),
    };
    result.map_err(|err| CliError::incomplete(format!("failed to write {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Parses a non-empty image reference.
fn parse_image(raw: &str) -> CliResult<ImageRef> {
    let image_ref = ImageRef::new(raw);
    if image_ref.is_empty() {
        return Err(CliError::incomplete("image reference must be non-empty"));
    }
    Ok(image_ref)
}

/// Reads a size-limited JSON input file.
fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = read_limited(path)
        .map_err(|err| CliError::incomplete(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::incomplete(format!("invalid JSON in {}: {err}", path.display())))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Appends a titled finding list.
fn push_findings(out: &mut String, title: &str, findings: &[Violation]) {
    if findings.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}: {}", findings.len()));
    for finding in findings {
        out.push_str(&format!("\n  [{}] {}: {}", finding.severity, finding.rule, finding.message));
        if let Some(resource) = &finding.resource {
            out.push_str(&format!(" ({resource})"));
        }
    }
}

/// Writes pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::incomplete(format!("failed to render JSON: {err}")))?;
    write_stdout(&text)
}

/// Writes a single line to stdout.
fn write_stdout(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::incomplete(format!("failed to write stdout: {err}")))
}

/// Writes a single line to stderr, ignoring failures.
fn write_stderr(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
}

/// Emits an error message to stderr and returns its exit code.
fn emit_error(err: &CliError) -> ExitCode {
    write_stderr(&format!("error: {err}"));
    ExitCode::from(err.exit)
}
