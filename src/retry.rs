//! Polling cadence and abort policy for the status loop.
//!
//! `RetryPolicy` is pure policy: it decides how long to wait between polls and
//! when a session must stop polling, but performs no I/O itself.

use std::time::Duration;

/// Interval between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Ceiling on total poll attempts (~6 minutes at the default interval).
const DEFAULT_MAX_ATTEMPTS: u32 = 240;

/// Budget of consecutive transport/parse failures before giving up on the
/// connection.
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Emit a "session not yet visible" warning at most once per this many polls.
const DEFAULT_NOT_VISIBLE_LOG_EVERY: u32 = 5;

/// Why the polling loop must stop retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The total attempt ceiling was reached without a terminal response.
    AttemptsExhausted,
    /// Too many consecutive transport/parse failures.
    ConsecutiveFailures,
}

/// Poll cadence and abort thresholds for one session.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub max_consecutive_failures: u32,
    pub not_visible_log_every: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            not_visible_log_every: DEFAULT_NOT_VISIBLE_LOG_EVERY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next poll attempt. The cadence is fixed; the attempt
    /// index is accepted so callers don't need to know that.
    pub fn next_delay(&self, _attempt: u32) -> Duration {
        self.poll_interval
    }

    /// Whether polling must stop, and why.
    ///
    /// The attempt ceiling is checked first: a session that ran out its full
    /// budget reads as a timeout even if the last few polls also failed.
    /// A 404 "not yet visible" poll counts toward neither bound.
    pub fn should_abort(&self, attempt: u32, consecutive_failures: u32) -> Option<AbortReason> {
        if attempt > self.max_attempts {
            Some(AbortReason::AttemptsExhausted)
        } else if consecutive_failures > self.max_consecutive_failures {
            Some(AbortReason::ConsecutiveFailures)
        } else {
            None
        }
    }
}

/// Suppression state for "session not yet visible" log lines.
///
/// The remote service may not have registered a session by the time polling
/// starts, so early 404s are expected; they are logged only every
/// `not_visible_log_every` polls. The tracker is reset on the first
/// successful poll.
#[derive(Debug, Default)]
pub struct NotVisibleTracker {
    last_warned: u32,
}

impl NotVisibleTracker {
    /// Record a suppressed poll and report whether it is time to warn.
    pub fn should_warn(&mut self, attempt: u32, every: u32) -> bool {
        if attempt.saturating_sub(self.last_warned) >= every {
            self.last_warned = attempt;
            true
        } else {
            false
        }
    }

    /// Reset suppression after a successful poll.
    pub fn reset(&mut self) {
        self.last_warned = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── RetryPolicy ──────────────────────────────────────────────────

    #[test]
    fn delay_is_fixed_across_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(0), Duration::from_millis(1500));
        assert_eq!(policy.next_delay(1), policy.next_delay(239));
    }

    #[test]
    fn no_abort_within_budgets() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.should_abort(1, 0), None);
        assert_eq!(policy.should_abort(240, 20), None);
    }

    #[test]
    fn attempt_ceiling_times_out() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_abort(241, 0),
            Some(AbortReason::AttemptsExhausted)
        );
    }

    #[test]
    fn consecutive_failures_lose_connection_before_ceiling() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_abort(30, 21),
            Some(AbortReason::ConsecutiveFailures)
        );
    }

    #[test]
    fn attempt_ceiling_wins_when_both_exceeded() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_abort(241, 21),
            Some(AbortReason::AttemptsExhausted)
        );
    }

    #[test]
    fn custom_thresholds_are_respected() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_consecutive_failures: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.should_abort(3, 0), None);
        assert_eq!(
            policy.should_abort(4, 0),
            Some(AbortReason::AttemptsExhausted)
        );
        assert_eq!(
            policy.should_abort(2, 2),
            Some(AbortReason::ConsecutiveFailures)
        );
    }

    // ── NotVisibleTracker ────────────────────────────────────────────

    #[test]
    fn tracker_warns_on_configured_cadence() {
        let mut tracker = NotVisibleTracker::default();
        assert!(tracker.should_warn(5, 5));
        assert!(!tracker.should_warn(6, 5));
        assert!(!tracker.should_warn(9, 5));
        assert!(tracker.should_warn(10, 5));
    }

    #[test]
    fn tracker_is_silent_before_first_threshold() {
        let mut tracker = NotVisibleTracker::default();
        for attempt in 1..5 {
            assert!(!tracker.should_warn(attempt, 5));
        }
    }

    #[test]
    fn tracker_resets_on_success() {
        let mut tracker = NotVisibleTracker::default();
        assert!(tracker.should_warn(7, 5));
        assert!(!tracker.should_warn(8, 5));
        tracker.reset();
        // After a reset the suppression window counts from zero again.
        assert!(tracker.should_warn(8, 5));
    }
}
