use std::time::Duration;

use rand::Rng;

/// How often a store reruns a transaction body after conflicts.
#[derive(Clone, Debug)]
pub struct TxRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for TxRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(64),
            jitter: true,
        }
    }
}

impl TxRetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

pub(crate) struct TxRetryState<'a> {
    policy: &'a TxRetryPolicy,
    attempts: u32,
}

impl<'a> TxRetryState<'a> {
    pub(crate) fn new(policy: &'a TxRetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a conflicting attempt. Returns the pause before the next one,
    /// or `None` once the attempt budget is spent.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let power = (self.attempts - 1).min(16);
        let mut delay = self
            .policy
            .base_delay
            .saturating_mul(1 << power)
            .min(self.policy.max_delay);
        if self.policy.jitter {
            let micros = delay.as_micros().max(1) as u64;
            let jitter = rand::thread_rng().gen_range(0..=micros);
            delay = Duration::from_micros(jitter);
        }
        Some(delay)
    }
}
