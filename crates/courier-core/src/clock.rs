// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock source tied to the tokio timer.
//!
//! Persisted timestamps (`available_at`, `expires_at`) are wall-clock values,
//! while every wait is a tokio sleep. [`Clock`] derives the wall clock from
//! `tokio::time::Instant` so both move together, including under a paused
//! test runtime.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Monotonic wall clock anchored at construction time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor_instant: Instant::now(),
        }
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed =
            TimeDelta::from_std(self.anchor_instant.elapsed()).unwrap_or(TimeDelta::zero());
        self.anchor_wall + elapsed
    }

    /// `now + delay`.
    pub fn after(&self, delay: Duration) -> DateTime<Utc> {
        TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| self.now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time remaining until `at`, zero if it already passed.
    pub fn until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn now_follows_paused_time() {
        let clock = Clock::new();
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(2500)).await;
        let elapsed = clock.now() - start;
        assert_eq!(elapsed.num_milliseconds(), 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn until_saturates_at_zero() {
        let clock = Clock::new();
        let deadline = clock.after(Duration::from_secs(1));
        assert_eq!(clock.until(deadline), Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.until(deadline), Duration::ZERO);
    }
}
