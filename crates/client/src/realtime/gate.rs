//! Admission control for full dashboard fetches

use std::time::Duration;
use tokio::time::Instant;

/// Outcome of asking the gate for permission to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Proceed,
    /// Another fetch started less than the debounce interval ago
    Debounced,
    /// A fetch is still running
    InFlight,
    /// A rate-limit cool-down is in effect
    CoolingDown { remaining: Duration },
}

/// Debounce, single in-flight and rate-limit cool-down for polling.
///
/// Every fetch must call [`PollGate::try_begin`] and, if it proceeds, one
/// of the `finish_*` methods.
#[derive(Debug, Clone)]
pub struct PollGate {
    debounce: Duration,
    default_cooldown: Duration,
    last_started: Option<Instant>,
    in_flight: bool,
    cooldown_until: Option<Instant>,
}

impl PollGate {
    pub fn new(debounce: Duration, default_cooldown: Duration) -> Self {
        Self {
            debounce,
            default_cooldown,
            last_started: None,
            in_flight: false,
            cooldown_until: None,
        }
    }

    /// `manual` skips the debounce (an explicit refresh) but never the
    /// in-flight guard or the cool-down
    pub fn try_begin(&mut self, now: Instant, manual: bool) -> PollDecision {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return PollDecision::CoolingDown {
                    remaining: until - now,
                };
            }
            self.cooldown_until = None;
        }
        if self.in_flight {
            return PollDecision::InFlight;
        }
        if !manual {
            if let Some(last) = self.last_started {
                if now.duration_since(last) < self.debounce {
                    return PollDecision::Debounced;
                }
            }
        }
        self.in_flight = true;
        self.last_started = Some(now);
        PollDecision::Proceed
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    /// End a fetch that got HTTP 429. Returns when fetching may resume.
    pub fn finish_rate_limited(&mut self, now: Instant, retry_after: Option<Duration>) -> Instant {
        self.in_flight = false;
        let until = now + retry_after.unwrap_or(self.default_cooldown);
        self.cooldown_until = Some(until);
        until
    }

    pub fn cooldown_until(&self, now: Instant) -> Option<Instant> {
        self.cooldown_until.filter(|until| now < *until)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn gate() -> PollGate {
        PollGate::new(SECOND * 5, SECOND * 60)
    }

    #[test]
    fn test_debounce_and_in_flight() {
        let start = Instant::now();
        let mut gate = gate();

        assert_eq!(gate.try_begin(start, false), PollDecision::Proceed);
        assert_eq!(gate.try_begin(start + SECOND, false), PollDecision::InFlight);
        assert_eq!(gate.try_begin(start + SECOND, true), PollDecision::InFlight);
        gate.finish();

        assert_eq!(gate.try_begin(start + SECOND * 2, false), PollDecision::Debounced);
        assert_eq!(gate.try_begin(start + SECOND * 2, true), PollDecision::Proceed);
        gate.finish();
        assert_eq!(gate.try_begin(start + SECOND * 8, false), PollDecision::Proceed);
    }

    #[test]
    fn test_rate_limit_cooldown() {
        let start = Instant::now();
        let mut gate = gate();

        assert_eq!(gate.try_begin(start, false), PollDecision::Proceed);
        let until = gate.finish_rate_limited(start, None);
        assert_eq!(until, start + SECOND * 60);
        assert!(!gate.is_in_flight());

        assert_eq!(
            gate.try_begin(start + SECOND * 10, true),
            PollDecision::CoolingDown {
                remaining: SECOND * 50
            }
        );
        assert_eq!(gate.cooldown_until(start + SECOND * 59), Some(until));
        assert_eq!(gate.cooldown_until(start + SECOND * 60), None);
        assert_eq!(gate.try_begin(start + SECOND * 61, false), PollDecision::Proceed);
    }

    #[test]
    fn test_retry_after_overrides_default() {
        let start = Instant::now();
        let mut gate = gate();
        gate.try_begin(start, false);
        let until = gate.finish_rate_limited(start, Some(SECOND * 7));
        assert_eq!(until, start + SECOND * 7);
    }
}
