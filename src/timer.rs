//! Failsafe timer guarding an in-progress update.
//!
//! The original engine armed a one-shot OS timer for `MAX_FW_UPDATE_TIME_FAIL_SAFE_MS`
//! (20 minutes) on offer acceptance and cleared `update_in_progress` if it ever fired, so a
//! host that vanished mid-transfer could never wedge the target indefinitely. This is the same
//! deadline tracked against an explicit [`embassy_time::Instant`] rather than a free-running
//! wall-clock sleep, so tests can advance time deterministically instead of waiting 20 minutes.

use embassy_time::{Duration, Instant};

/// Default failsafe window: 20 minutes, matching the original engine's constant.
pub const DEFAULT_FAILSAFE_DURATION: Duration = Duration::from_millis(20 * 60 * 1000);

/// One-shot deadline timer for an in-progress update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeTimer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl FailsafeTimer {
    /// Creates a disarmed timer with the given failsafe window.
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// Arms (or re-arms) the timer, measured from `now`. Called on offer acceptance and
    /// restarted on every subsequent accepted offer in the same transaction.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.duration);
    }

    /// Disarms the timer. Called once the update completes or the bank swap commits.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True if the timer is currently armed.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True if the timer is armed and `now` is at or past the deadline. Does not disarm the
    /// timer; callers that act on expiry should follow up with [`FailsafeTimer::cancel`].
    pub fn has_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

impl Default for FailsafeTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FAILSAFE_DURATION)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn instant_at_ms(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn disarmed_timer_never_expires() {
        let timer = FailsafeTimer::default();
        assert!(!timer.is_armed());
        assert!(!timer.has_expired(instant_at_ms(u64::MAX / 2)));
    }

    #[test]
    fn timer_expires_only_after_duration_elapses() {
        let mut timer = FailsafeTimer::new(Duration::from_millis(1000));
        timer.start(instant_at_ms(0));
        assert!(!timer.has_expired(instant_at_ms(999)));
        assert!(timer.has_expired(instant_at_ms(1000)));
        assert!(timer.has_expired(instant_at_ms(5000)));
    }

    #[test]
    fn restart_moves_the_deadline_forward() {
        let mut timer = FailsafeTimer::new(Duration::from_millis(1000));
        timer.start(instant_at_ms(0));
        timer.start(instant_at_ms(500));
        assert!(!timer.has_expired(instant_at_ms(1000)));
        assert!(timer.has_expired(instant_at_ms(1500)));
    }

    #[test]
    fn cancel_disarms_the_timer() {
        let mut timer = FailsafeTimer::new(Duration::from_millis(1000));
        timer.start(instant_at_ms(0));
        timer.cancel();
        assert!(!timer.is_armed());
        assert!(!timer.has_expired(instant_at_ms(10_000)));
    }
}
