//! Dispatcher configuration
//!
//! Aggregates the per-component configuration blocks so a whole dispatcher
//! can be described by one TOML table:
//!
//! ```toml
//! [rate_limit]
//! ceiling = 5
//!
//! [circuit_breaker]
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! multiplier = 2
//! ```
//!
//! Every field is optional and falls back to the defaults shown above.

use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::CircuitBreakerConfig, error::ConfigError, policy::RetryPolicy,
    rate_limiter::RateLimitConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    /// Reject values that would make the dispatcher meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "circuit_breaker.failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.retry.multiplier == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.multiplier",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
