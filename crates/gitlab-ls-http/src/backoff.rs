//! Exponential backoff between retry attempts
//!
//! The delay ceiling grows as `initial_delay * multiplier^attempt` and is
//! capped at `max_delay`. Jitter draws the actual delay below the ceiling,
//! but a [`Backoff`] never hands out a delay shorter than the one before it,
//! so a run of failures always waits at least as long as the previous retry.

use std::time::Duration;

use rand::Rng;

/// How much randomness to apply below the delay ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Always wait the full ceiling
    None,
    /// Wait somewhere in `[ceiling / 2, ceiling]`
    Equal,
}

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Ceiling of the first retry delay
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Jitter strategy
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: Jitter::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Calculate the delay ceiling for given attempt number
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Start a fresh backoff sequence using this policy
    pub fn start(&self) -> Backoff {
        Backoff::new(self.clone())
    }
}

/// Stateful backoff sequence for one retry loop
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    /// Create a new backoff sequence
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Next delay to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with_hint(None)
    }

    /// Next delay, raised towards the server's hint when one was given
    ///
    /// The hint never lifts the delay above `max_delay`.
    pub fn next_delay_with_hint(&mut self, hint: Option<Duration>) -> Duration {
        let ceiling = self.policy.ceiling(self.attempt);
        let jittered = match self.policy.jitter {
            Jitter::None => ceiling,
            Jitter::Equal => {
                let half = ceiling / 2;
                let spread = (ceiling - half).as_millis() as u64;
                half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
            }
        };

        let mut delay = jittered.max(self.last).min(self.policy.max_delay);
        if let Some(hint) = hint {
            delay = delay.max(hint.min(self.policy.max_delay));
        }

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}
