//! Reconnection backoff schedule.
//!
//! Fixed steps `[0s, 2s, 10s, 30s]`, repeating the final interval
//! indefinitely: the first retry is immediate (most drops are blips),
//! and the ceiling keeps a dead hub from being hammered.

use std::time::Duration;

/// The delay schedule; the last entry repeats forever.
const SCHEDULE: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

/// Iterator over reconnection delays.
#[derive(Debug, Default)]
pub struct ReconnectBackoff {
    attempt: usize,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = SCHEDULE[self.attempt.min(SCHEDULE.len() - 1)];
        self.attempt += 1;
        delay
    }

    /// Number of attempts handed out so far.
    pub fn attempts(&self) -> usize {
        self.attempt
    }

    /// Start over after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ── Tests ────────────────────────────────────────────────────────
