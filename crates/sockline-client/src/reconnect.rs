//! Reconnection backoff state machine.

use std::time::Duration;

use crate::config::ReconnectPolicy;
use crate::event::ConnectionState;

/// Floor applied to every jittered delay.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectDecision {
    /// Reconnection is turned off; the engine goes idle.
    Disabled,
    /// Attempts exceeded the maximum; the engine goes idle.
    Exhausted { attempts: u32 },
    /// Wait `delay` and try again.
    Retry { attempt: u32, delay: Duration },
}

/// Tracks connection state, attempt count and the current backoff delay.
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempt: u32,
    previous: Option<Duration>,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            attempt: 0,
            previous: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// A transport opened: reset the backoff.
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.previous = None;
    }

    /// Explicit stop; the next connect starts from scratch.
    pub fn stop(&mut self) {
        self.state = ConnectionState::Idle;
        self.attempt = 0;
        self.previous = None;
    }

    /// Record a failure and decide whether to retry.
    pub fn failed(&mut self) -> ReconnectDecision {
        self.failed_with(fastrand::f64())
    }

    /// As [`failed`](Self::failed) with an explicit jitter sample in `[0, 1)`.
    pub fn failed_with(&mut self, sample: f64) -> ReconnectDecision {
        if !self.policy.enabled {
            self.state = ConnectionState::Idle;
            return ReconnectDecision::Disabled;
        }
        self.attempt += 1;
        if self.attempt > self.policy.max_attempts {
            let attempts = self.attempt - 1;
            self.stop();
            return ReconnectDecision::Exhausted { attempts };
        }

        let base = self.next_base_delay();
        self.previous = Some(base);
        self.state = ConnectionState::Reconnecting;
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: apply_jitter(base, self.policy.jitter, sample),
        }
    }

    fn next_base_delay(&self) -> Duration {
        match self.previous {
            None => self.policy.initial_delay,
            Some(previous) => {
                Duration::try_from_secs_f64(previous.as_secs_f64() * self.policy.factor)
                    .unwrap_or(self.policy.max_delay)
                    .min(self.policy.max_delay)
            }
        }
    }
}

/// Shift `delay` by up to `± delay * fraction`; `sample` in `[0, 1)` picks
/// the point in that range. Never returns less than [`MIN_RECONNECT_DELAY`].
pub fn apply_jitter(delay: Duration, fraction: f64, sample: f64) -> Duration {
    let spread = delay.as_secs_f64() * fraction;
    let offset = spread * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
    let jittered = (delay.as_secs_f64() + offset).max(0.0);
    Duration::try_from_secs_f64(jittered)
        .unwrap_or(delay)
        .max(MIN_RECONNECT_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unjittered() -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    fn delays(controller: &mut ReconnectController, count: usize) -> Vec<f64> {
        (0..count)
            .map(|_| match controller.failed_with(0.5) {
                ReconnectDecision::Retry { delay, .. } => delay.as_secs_f64(),
                other => panic!("unexpected decision {other:?}"),
            })
            .collect()
    }

    #[test]
    fn backoff_sequence_doubles_to_cap() {
        let mut controller = ReconnectController::new(unjittered());
        assert_eq!(
            delays(&mut controller, 8),
            vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 20.0, 20.0]
        );
        assert_eq!(controller.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn success_resets_attempts_and_delay() {
        let mut controller = ReconnectController::new(unjittered());
        delays(&mut controller, 3);
        controller.connected();
        assert_eq!(controller.attempt(), 0);
        assert_eq!(delays(&mut controller, 1), vec![0.5]);
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let mut controller = ReconnectController::new(ReconnectPolicy {
            max_attempts: 2,
            ..unjittered()
        });
        delays(&mut controller, 2);
        assert_eq!(
            controller.failed_with(0.5),
            ReconnectDecision::Exhausted { attempts: 2 }
        );
        assert_eq!(controller.state(), ConnectionState::Idle);
    }

    #[test]
    fn disabled_policy_goes_idle() {
        let mut controller = ReconnectController::new(ReconnectPolicy::disabled());
        controller.begin_connect();
        assert_eq!(controller.failed(), ReconnectDecision::Disabled);
        assert_eq!(controller.state(), ConnectionState::Idle);
    }

    #[test]
    fn huge_factor_saturates_at_max_delay() {
        let mut controller = ReconnectController::new(ReconnectPolicy {
            factor: 1e300,
            ..unjittered()
        });
        assert_eq!(delays(&mut controller, 3), vec![0.5, 20.0, 20.0]);
    }

    #[test]
    fn jitter_past_duration_range_keeps_delay() {
        assert_eq!(apply_jitter(Duration::MAX, 1.0, 1.0), Duration::MAX);
    }

    #[test]
    fn jitter_is_symmetric_and_floored() {
        let base = Duration::from_secs(4);
        assert_eq!(apply_jitter(base, 0.25, 0.0), Duration::from_secs(3));
        assert_eq!(apply_jitter(base, 0.25, 0.5), Duration::from_secs(4));
        assert_eq!(apply_jitter(base, 0.25, 1.0), Duration::from_secs(5));
        assert_eq!(
            apply_jitter(Duration::from_millis(10), 1.0, 0.0),
            MIN_RECONNECT_DELAY
        );
    }
}
