//! Global acceptance ceiling
//!
//! Caps the number of messages the dispatcher accepts over the lifetime of a
//! coordinator. Every accepted message consumes one unit; once the ceiling
//! is reached every further message is refused.
//!
//! The count never resets and there is no refill: this is a lifetime budget,
//! not a per-window rate.

use serde::{Deserialize, Serialize};

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of messages accepted for sending
    #[serde(default = "default_ceiling")]
    pub ceiling: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ceiling: default_ceiling(),
        }
    }
}

const fn default_ceiling() -> u64 {
    5
}

/// Counts accepted messages against the configured ceiling.
///
/// Not synchronised; the coordinator guards it together with the
/// idempotency set so that checking and consuming happen atomically.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    accepted: u64,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            accepted: 0,
        }
    }

    /// Check whether another message may be accepted.
    ///
    /// Returns `Err(ceiling)` once the ceiling has been reached.
    pub const fn check(&self) -> Result<(), u64> {
        if self.accepted >= self.config.ceiling {
            Err(self.config.ceiling)
        } else {
            Ok(())
        }
    }

    /// Consume one unit of the budget.
    pub const fn consume(&mut self) {
        self.accepted = self.accepted.saturating_add(1);
    }

    #[must_use]
    pub const fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            accepted: self.accepted,
            ceiling: self.config.ceiling,
        }
    }
}

/// Statistics for the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Messages accepted so far
    pub accepted: u64,
    /// Configured ceiling
    pub ceiling: u64,
}

impl RateLimitStats {
    /// Messages that may still be accepted
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.accepted)
    }
}
