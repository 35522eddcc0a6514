//! The per-room action clock.

use std::future::pending;

use tokio::time::{Duration, Instant, sleep_until};

/// Single-slot deadline for the player on the clock.
///
/// A room has at most one pending action at a time, so one rearmable
/// deadline is all it takes. Arming replaces any previous deadline.
/// [`ActionClock::wait`] is cancel-safe: the deadline is absolute, so a
/// unit can poll it fresh on every pass through its `select!` loop.
#[derive(Debug, Default)]
pub struct ActionClock {
    deadline: Option<Instant>,
}

impl ActionClock {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms (or rearms) the clock to fire `window` from now.
    pub fn arm(&mut self, window: Duration) {
        self.deadline = Some(Instant::now() + window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whole seconds left on the clock, rounded up. Zero when the
    /// clock is disarmed or already expired.
    pub fn remaining_seconds(&self) -> u32 {
        let Some(deadline) = self.deadline else {
            return 0;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut seconds = remaining.as_secs() as u32;
        if remaining.subsec_nanos() > 0 {
            seconds += 1;
        }
        seconds
    }

    /// Resolves when the armed deadline passes. Pends forever while
    /// disarmed, so it can sit unguarded in a `select!`.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => pending().await,
        }
    }
}
