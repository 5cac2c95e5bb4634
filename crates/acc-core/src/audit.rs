// crates/acc-core/src/audit.rs
// ============================================================================
// Module: ACC Audit Logging
// Description: Structured audit events for trust decisions and side effects.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every trust-relevant step (state lookups, attestation writes, signature
//! rejections, remote degradation, gate decisions) emits a
//! [`TrustAuditEvent`] through a [`TrustAuditSink`]. Sinks are deliberately
//! small so hosts can route events to stderr, an append-only file, or nowhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Step completed.
    Ok,
    /// Step was refused on trust grounds.
    Denied,
    /// Step fell back to a reduced result (e.g. local-only attestations).
    Degraded,
    /// Step failed for operational reasons.
    Error,
}

/// Trust audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TrustAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Outcome classification.
    pub outcome: AuditOutcome,
    /// Image reference when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Image digest when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_digest: Option<String>,
    /// Reason label or message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// File path when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl TrustAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, outcome: AuditOutcome) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            outcome,
            image_ref: None,
            image_digest: None,
            reason: None,
            path: None,
        }
    }

    /// Attaches an image reference.
    #[must_use]
    pub fn image(mut self, image_ref: impl ToString) -> Self {
        self.image_ref = Some(image_ref.to_string());
        self
    }

    /// Attaches an image digest.
    #[must_use]
    pub fn digest(mut self, digest: impl ToString) -> Self {
        self.image_digest = Some(digest.to_string());
        self
    }

    /// Attaches a reason.
    #[must_use]
    pub fn reason(mut self, reason: impl ToString) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Attaches a file path.
    #[must_use]
    pub fn path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for trust events.
pub trait TrustAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &TrustAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl TrustAuditSink for StderrAuditSink {
    fn record(&self, event: &TrustAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TrustAuditSink for FileAuditSink {
    fn record(&self, event: &TrustAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl TrustAuditSink for NoopAuditSink {
    fn record(&self, _event: &TrustAuditEvent) {}
}

/// In-memory audit sink for tests and embedding hosts.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events.
    events: Mutex<Vec<TrustAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TrustAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns true when an event with the given name was recorded.
    #[must_use]
    pub fn saw(&self, event: &str) -> bool {
        self.events().iter().any(|recorded| recorded.event == event)
    }
}

impl TrustAuditSink for MemoryAuditSink {
    fn record(&self, event: &TrustAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
