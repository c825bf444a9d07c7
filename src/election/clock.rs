//! Time Sources
//!
//! Lease timestamps are wall-clock values shared with other participants,
//! so the elector reads them through a [`Clock`].

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source used to stamp and expire leases
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time that only moves forward
///
/// Anchored to the wall clock once, then advanced by tokio's monotonic
/// clock, so a system clock step cannot make a lease look older or younger
/// than it is. Also follows tokio's paused clock in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    /// Anchor at the current wall-clock time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor at an explicit wall-clock time
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_wall + elapsed
    }
}
