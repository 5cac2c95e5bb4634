// crates/acc-core/src/runtime/clock.rs
// ============================================================================
// Module: ACC Clocks
// Description: System and fixed clock implementations.
// Purpose: Supply timestamps to the trust core through the Clock interface.
// Dependencies: crate::{core, interfaces}, time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads the wall clock; [`FixedClock`] returns a constant
//! instant so tests can assert on file names and documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

use crate::core::time::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(OffsetDateTime::now_utc())
    }
}

/// Constant time source.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
