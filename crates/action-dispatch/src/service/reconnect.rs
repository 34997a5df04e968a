//! # Reconnect Policy
//!
//! A fixed-backoff retry policy: whenever the session enters the
//! disconnected state (including initial start), a single-shot timer is
//! armed; when it fires, one connect attempt is made and the timer is
//! re-armed on failure. Retries are unbounded, with no jitter and no
//! maximum attempt count, favoring availability over backoff
//! sophistication.

use std::time::Duration;
use tokio::time::Instant;

/// Default delay between connect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection lifecycle state as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; the reconnect timer is (or is about to be) armed.
    Disconnected,
    /// A connect attempt is in flight, awaiting the connected
    /// notification.
    Connecting,
    /// The session is connected and subscriptions are live.
    Connected,
}

/// Single-shot reconnect timer.
#[derive(Debug)]
pub struct ReconnectTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    /// Timer with the given fixed delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// The configured fixed delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer one delay from now.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Cancel a pending fire.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Whether a fire is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Deadline of the pending fire, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for ReconnectTimer {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_arm_sets_deadline_one_delay_out() {
        let mut timer = ReconnectTimer::new(Duration::from_secs(5));
        assert!(!timer.is_armed());

        let before = Instant::now();
        timer.arm();
        let deadline = timer.deadline().unwrap();
        assert_eq!(deadline, before + Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_pushes_deadline_forward() {
        let mut timer = ReconnectTimer::new(Duration::from_secs(5));
        timer.arm();
        let first = timer.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        timer.arm();
        assert!(timer.deadline().unwrap() > first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_clears_deadline() {
        let mut timer = ReconnectTimer::default();
        assert_eq!(timer.delay(), DEFAULT_RECONNECT_DELAY);
        timer.arm();
        timer.disarm();
        assert!(!timer.is_armed());
        assert!(timer.deadline().is_none());
    }
}
