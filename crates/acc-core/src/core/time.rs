// crates/acc-core/src/core/time.rs
// ============================================================================
// Module: ACC Time Model
// Description: UTC timestamps for records, attestations, and file names.
// Purpose: Keep wall-clock reads behind an explicit value supplied by a clock.
// Dependencies: time
// ============================================================================

//! ## Overview
//! The trust core never reads the wall clock directly. Hosts obtain a
//! [`Timestamp`] from a [`crate::interfaces::Clock`] and pass it down, which
//! keeps attestation creation replayable in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC instant with microsecond-or-better precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps a date-time, converting it to UTC.
    #[must_use]
    pub fn new(value: OffsetDateTime) -> Self {
        Self(value.to_offset(UtcOffset::UTC))
    }

    /// Builds a timestamp from unix nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] when the value is not representable.
    pub fn from_unix_nanos(nanos: i128) -> Result<Self, TimeError> {
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .map_err(|err| TimeError::OutOfRange(err.to_string()))
    }

    /// Renders the timestamp as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Format`] when the date cannot be rendered.
    pub fn to_rfc3339(&self) -> Result<String, TimeError> {
        self.0.format(&Rfc3339).map_err(|err| TimeError::Format(err.to_string()))
    }

    /// Renders a sortable, path-safe stamp with microsecond precision.
    ///
    /// Format: `YYYYMMDDTHHMMSS.ffffffZ`.
    #[must_use]
    pub fn file_stamp(&self) -> String {
        let value = self.0;
        format!(
            "{:04}{:02}{:02}T{:02}{:02}{:02}.{:06}Z",
            value.year(),
            u8::from(value.month()),
            value.day(),
            value.hour(),
            value.minute(),
            value.second(),
            value.microsecond()
        )
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// Value outside the representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
    /// Formatting failed.
    #[error("timestamp format failed: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
