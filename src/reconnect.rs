//! Reconnect policy and its exponential back-off schedule.

use std::time::Duration;

/// Configuration for reconnection after an unexpected transport loss.
///
/// The delay starts at `initial_delay` and doubles on each failed attempt,
/// capped at `max_delay`. A successful reconnect resets the schedule.
///
/// # Default Values
/// - `initial_delay`: 250 milliseconds
/// - `max_delay`: 30 seconds
/// - `max_attempts`: unlimited
///
/// # Invariants
/// - `initial_delay` must not exceed `max_delay`
/// - `initial_delay` must be at least 1 millisecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all; when `false` a transport loss is final.
    pub enabled: bool,
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay once attempts have increased exponentially.
    pub max_delay: Duration,
    /// Give up after this many consecutive failures; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects; any transport loss closes the
    /// connection.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }
}

/// Mutable schedule state derived from a [`ReconnectPolicy`].
#[derive(Clone, Debug)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    next_delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        let policy = policy.normalized();
        Self {
            next_delay: policy.initial_delay,
            attempts: 0,
            policy,
        }
    }

    /// Delay before the next attempt, or `None` when the schedule is
    /// exhausted (or the policy is disabled).
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        if let Some(max) = self.policy.max_attempts
            && self.attempts >= max
        {
            return None;
        }
        self.attempts += 1;
        let delay = self.next_delay;
        self.next_delay = (delay * 2).min(self.policy.max_delay);
        Some(delay)
    }

    /// Attempts made since the last reset.
    pub(crate) fn attempts(&self) -> u32 { self.attempts }

    /// Restart the schedule after a successful reconnect.
    pub(crate) fn reset(&mut self) {
        self.next_delay = self.policy.initial_delay;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_attempts: None,
        });
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(350)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(350)));
    }

    #[test]
    fn schedule_exhausts_after_max_attempts() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(ReconnectPolicy {
            max_attempts: Some(1),
            ..ReconnectPolicy::default()
        });
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn disabled_policy_never_yields_a_delay() {
        let mut backoff = Backoff::new(ReconnectPolicy::disabled());
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn normalized_swaps_inverted_bounds() {
        let policy = ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_millis(1),
            max_attempts: None,
        }
        .normalized();
        assert_eq!(policy.initial_delay, Duration::from_millis(1));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn normalized_raises_zero_delays() {
        let policy = ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: None,
        }
        .normalized();
        assert_eq!(policy.initial_delay, Duration::from_millis(1));
        assert_eq!(policy.max_delay, Duration::from_millis(1));
    }
}
