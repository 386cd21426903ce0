//! Bounded poll-until-condition primitive.
//!
//! All waiting in the engine goes through [`Deadline`]: callers check their
//! condition, then call [`Deadline::tick`] which sleeps one poll interval (clamped
//! to the deadline) and reports whether another check is allowed. There is no
//! background polling; the loop runs on the caller's task. Uses tokio's clock, so
//! tests can run it under `tokio::time::pause()`.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    interval: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration, interval: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            interval,
        }
    }

    /// A nested deadline that ends after `timeout` or with `self`, whichever is first.
    pub fn sub(&self, timeout: Duration) -> Self {
        Self {
            at: (Instant::now() + timeout).min(self.at),
            interval: self.interval,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the next poll. Returns `false` without sleeping once the deadline
    /// has passed, which ends the caller's loop.
    pub async fn tick(&self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        tokio::time::sleep(self.interval.min(remaining)).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_counts_are_bounded() {
        let deadline = Deadline::after(Duration::from_millis(1000), Duration::from_millis(250));
        let mut ticks = 0;
        while deadline.tick().await {
            ticks += 1;
        }
        assert_eq!(ticks, 4);
        assert!(deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_tick_is_clamped() {
        let started = Instant::now();
        let deadline = Deadline::after(Duration::from_millis(300), Duration::from_millis(250));
        while deadline.tick().await {}
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_deadline_never_outlives_parent() {
        let parent = Deadline::after(Duration::from_millis(100), Duration::from_millis(10));
        let child = parent.sub(Duration::from_secs(5));
        assert!(child.remaining() <= Duration::from_millis(100));

        let child = parent.sub(Duration::from_millis(20));
        while child.tick().await {}
        assert!(child.expired());
        assert!(!parent.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_already_expired() {
        let deadline = Deadline::after(Duration::ZERO, Duration::from_millis(50));
        assert!(deadline.expired());
        assert!(!deadline.tick().await);
    }
}
