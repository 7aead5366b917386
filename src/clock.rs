//! Time source abstraction
//!
//! Observers are pure state machines that take signal timestamps as
//! parameters; the session stamps live signals through this trait so replayed
//! logs and tests stay deterministic.

use chrono::{DateTime, Utc};

/// Source of "now" for live signal stamping.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
