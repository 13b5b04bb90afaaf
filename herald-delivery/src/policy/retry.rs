//! Retry policy for send attempts.
//!
//! Encapsulates how many times a single provider is tried for one message
//! and how long to wait between attempts, independently of the retrier that
//! executes it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration.
///
/// Delays grow geometrically: the wait before retry `n` (0-indexed) is
/// `initial_delay_ms * multiplier^n`. There is no jitter and no cap beyond
/// saturation, so the sequence is fully deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of send attempts against one provider.
    ///
    /// Default: 3 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds).
    ///
    /// Default: 1000 milliseconds
    #[serde(default = "defaults::initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Factor applied to the delay after every retry.
    ///
    /// Default: 2
    #[serde(default = "defaults::multiplier")]
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_delay_ms: defaults::initial_delay_ms(),
            multiplier: defaults::multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(retry);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }

    /// The waits between consecutive attempts, in order.
    ///
    /// With `max_attempts` attempts there are `max_attempts - 1` waits.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|retry| self.delay_for(retry))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn initial_delay_ms() -> u64 {
        1000
    }

    pub const fn multiplier() -> u32 {
        2
    }
}
