//! General time utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of monotonic time in seconds.
///
/// The origin is arbitrary, only differences between readings are
/// meaningful.
pub trait Clock {
    fn now_s(&self) -> f64;
}

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

/// A clock which only moves when told to.
///
/// Clones share the same time, so a test can hold one handle while the code
/// under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_s(&self) -> f64 {
        // Offset by one second so the first reading is never zero, zero is
        // used as "never" by callers.
        self.start.elapsed().as_secs_f64() + 1.0
    }
}

impl ManualClock {
    /// Create a new clock starting at `start_s` seconds.
    pub fn new(start_s: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_s)),
        }
    }

    /// Move the clock forward by `dt_s` seconds.
    pub fn advance(&self, dt_s: f64) {
        self.now.set(self.now.get() + dt_s);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now_s: f64) {
        self.now.set(now_s);
    }
}

impl Clock for ManualClock {
    fn now_s(&self) -> f64 {
        self.now.get()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}
