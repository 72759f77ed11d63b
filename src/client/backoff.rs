//! Redial delay policies.
//!
//! The default is a flat [`DIAL_RETRY_DELAY`] pause after each failed dial.
//! `Immediate` redials straight away and is opt-in. `ExponentialJitter`
//! spreads retries out so many clients do not hammer a restarting server
//! in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{BACKOFF_BASE, BACKOFF_MAX, DIAL_RETRY_DELAY};

/// How long to wait between failed dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Redial with no delay.
    Immediate,
    /// Wait the same delay after every failure.
    Fixed {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Start at `base_ms`, double per failure up to `max_ms`, and add
    /// uniform jitter in `[0, current)` to each wait.
    ExponentialJitter {
        /// First delay in milliseconds.
        base_ms: u64,
        /// Ceiling for the un-jittered delay in milliseconds.
        max_ms: u64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DIAL_RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl ReconnectPolicy {
    /// Exponential policy with the stock 1s base and 20s ceiling.
    pub fn exponential() -> Self {
        Self::ExponentialJitter {
            base_ms: BACKOFF_BASE.as_millis() as u64,
            max_ms: BACKOFF_MAX.as_millis() as u64,
        }
    }

    /// Fresh backoff state for one reconnect cycle.
    pub fn backoff(self) -> Backoff {
        Backoff::new(self)
    }
}

/// Running backoff state: the attempt counter and the current delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
    current: Duration,
}

impl Backoff {
    /// Start a cycle at attempt zero.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            current: Self::initial_delay(policy),
        }
    }

    fn initial_delay(policy: ReconnectPolicy) -> Duration {
        match policy {
            ReconnectPolicy::Immediate => Duration::ZERO,
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            ReconnectPolicy::ExponentialJitter { base_ms, .. } => Duration::from_millis(base_ms),
        }
    }

    /// Record a failed attempt and return how long to wait before the next.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        match self.policy {
            ReconnectPolicy::Immediate | ReconnectPolicy::Fixed { .. } => self.current,
            ReconnectPolicy::ExponentialJitter { max_ms, .. } => {
                let base = self.current;
                self.current = base
                    .saturating_mul(2)
                    .min(Duration::from_millis(max_ms).max(base));
                base + jitter(base)
            }
        }
    }

    /// Back to attempt zero after a successful dial.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = Self::initial_delay(self.policy);
    }

    /// Consecutive failed attempts in this cycle.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The policy driving this backoff.
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }
}

/// Uniform random delay in `[0, base)`.
fn jitter(base: Duration) -> Duration {
    let millis = base.as_millis() as u64;
    if millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..millis))
}
