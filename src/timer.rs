//! Countdown timers on top of `embassy-time`.

use embassy_time::{Duration, Instant};

/// A monotonic deadline started from a timeout.
///
/// Every wait inside the client is bounded by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Countdown {
    deadline: Instant,
}

impl Countdown {
    /// Starts a countdown that expires `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or(Instant::from_ticks(u64::MAX));
        Self { deadline }
    }

    /// Starts a countdown of `ms` milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left until the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining().as_millis()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
