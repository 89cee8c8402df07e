//! Cancellable fall escalation countdown.
//!
//! [`EscalationTimer`] is a plain value: it never reads a clock. The session
//! calls [`EscalationTimer::tick`] once per second while it is armed, which keeps
//! the single-flight and cancellation rules testable without waiting.

use crate::frame::TelemetryRecord;

/// Seconds between a detected fall and the alert being sent.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 7;

/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Nothing is armed.
    Idle,
    /// Still counting down.
    Counting {
        /// Seconds left after this tick.
        remaining: u32,
    },
    /// The countdown reached zero. The timer is disarmed and the record must be
    /// dispatched.
    Expired(TelemetryRecord),
}

#[derive(Debug, Clone)]
struct Armed {
    remaining: u32,
    record: TelemetryRecord,
}

/// Single-flight countdown holding the record that triggered it.
#[derive(Debug, Clone)]
pub struct EscalationTimer {
    countdown: u32,
    armed: Option<Armed>,
}

impl Default for EscalationTimer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTDOWN_SECS)
    }
}

impl EscalationTimer {
    /// Create a disarmed timer that counts down from `countdown` seconds (at least 1).
    #[must_use]
    pub fn new(countdown: u32) -> Self {
        Self {
            countdown: countdown.max(1),
            armed: None,
        }
    }

    /// Length of a full countdown.
    #[must_use]
    pub const fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Whether a countdown is running.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Seconds left, if armed.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.armed.as_ref().map(|a| a.remaining)
    }

    /// The record that started the running countdown.
    #[must_use]
    pub fn triggering_record(&self) -> Option<&TelemetryRecord> {
        self.armed.as_ref().map(|a| &a.record)
    }

    /// Start the countdown for `record`.
    ///
    /// Returns `false` and changes nothing if a countdown is already running.
    pub fn arm(&mut self, record: TelemetryRecord) -> bool {
        if self.armed.is_some() {
            return false;
        }
        self.armed = Some(Armed {
            remaining: self.countdown,
            record,
        });
        true
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> Tick {
        let Some(armed) = self.armed.as_mut() else {
            return Tick::Idle;
        };

        armed.remaining = armed.remaining.saturating_sub(1);
        if armed.remaining > 0 {
            return Tick::Counting {
                remaining: armed.remaining,
            };
        }

        match self.armed.take() {
            Some(expired) => Tick::Expired(expired.record),
            None => Tick::Idle,
        }
    }

    /// Stop the countdown without dispatching.
    ///
    /// Returns whether a countdown was running.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    fn fall(bpm: i64) -> TelemetryRecord {
        decode(format!(r#"{{"bpm":{bpm},"fall":true}}"#).as_bytes()).unwrap()
    }

    #[test]
    fn test_new_timer_is_idle() {
        let mut timer = EscalationTimer::default();
        assert!(!timer.is_armed());
        assert_eq!(timer.remaining(), None);
        assert_eq!(timer.tick(), Tick::Idle);
    }

    #[test]
    fn test_arm_starts_full_countdown() {
        let mut timer = EscalationTimer::default();
        assert!(timer.arm(fall(60)));
        assert_eq!(timer.remaining(), Some(7));
        assert_eq!(timer.triggering_record().unwrap().heart_rate, Some(60));
    }

    #[test]
    fn test_rearm_is_noop() {
        let mut timer = EscalationTimer::default();
        timer.arm(fall(60));
        timer.tick();
        timer.tick();

        assert!(!timer.arm(fall(140)));
        assert_eq!(timer.remaining(), Some(5));
        assert_eq!(timer.triggering_record().unwrap().heart_rate, Some(60));
    }

    #[test]
    fn test_expires_exactly_once_with_original_record() {
        let mut timer = EscalationTimer::default();
        timer.arm(fall(60));

        let mut expired = Vec::new();
        let mut counted = Vec::new();
        for second in 0..10 {
            if second == 3 {
                timer.arm(fall(99));
            }
            match timer.tick() {
                Tick::Counting { remaining } => counted.push(remaining),
                Tick::Expired(record) => expired.push(record),
                Tick::Idle => {}
            }
        }

        assert_eq!(counted, vec![6, 5, 4, 3, 2, 1]);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].heart_rate, Some(60));
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_cancel_before_expiry_prevents_dispatch() {
        for cancel_at in 0..7 {
            let mut timer = EscalationTimer::default();
            timer.arm(fall(60));
            for _ in 0..cancel_at {
                assert!(matches!(timer.tick(), Tick::Counting { .. }));
            }
            assert!(timer.cancel());
            for _ in 0..10 {
                assert_eq!(timer.tick(), Tick::Idle);
            }
        }
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timer = EscalationTimer::default();
        assert!(!timer.cancel());
        timer.arm(fall(60));
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(timer.triggering_record().is_none());
    }

    #[test]
    fn test_can_rearm_after_expiry() {
        let mut timer = EscalationTimer::new(1);
        timer.arm(fall(60));
        assert!(matches!(timer.tick(), Tick::Expired(_)));
        assert!(timer.arm(fall(70)));
        assert_eq!(timer.remaining(), Some(1));
    }

    #[test]
    fn test_zero_countdown_clamped() {
        let timer = EscalationTimer::new(0);
        assert_eq!(timer.countdown(), 1);
    }
}
