//! Per-provider circuit breaker
//!
//! Protects the dispatcher from repeatedly hammering a provider that keeps
//! failing. Each registered provider has its own breaker, indexed in parallel
//! with the provider registration.
//!
//! # States
//!
//! ```text
//! ┌─────────┐  consecutive failures reach threshold  ┌──────┐
//! │ Closed  │ ─────────────────────────────────────> │ Open │
//! └─────────┘                                        └──────┘
//!     ^                                                 │
//!     │               cooldown elapsed                  │
//!     └─────────────────────────────────────────────────┘
//! ```
//!
//! There is no half-open probing and no manual close: an open breaker only
//! closes when its cooldown timer fires, at which point the failure count is
//! cleared as well. A success while open clears the failure count but leaves
//! the breaker open.
//!
//! # Example
//!
//! ```text
//! Threshold: 3 consecutive failures
//! Cooldown: 60 seconds
//!
//! t=0s:   Closed
//! t=3s:   3rd consecutive failure → Open, reset scheduled for t=63s
//! t=3-63s: primary sends to this provider are refused
//! t=63s:  timer fires → Closed, failure count 0
//! ```

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use crate::status::{StatusKind, StatusLog};

/// Configuration for circuit breaker behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures that opens the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the breaker stays open before resetting (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_secs() -> u64 {
    60
}

#[derive(Debug)]
struct BreakerData {
    provider: String,
    consecutive_failures: u32,
    is_open: bool,
    /// Pending reset timer while the breaker is open
    reset: Option<AbortHandle>,
}

impl BreakerData {
    const fn new(provider: String) -> Self {
        Self {
            provider,
            consecutive_failures: 0,
            is_open: false,
            reset: None,
        }
    }
}

/// Circuit breakers for every registered provider
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: Vec<Arc<Mutex<BreakerData>>>,
    status: StatusLog,
}

impl CircuitBreaker {
    /// Create one closed breaker per provider name, in order.
    #[must_use]
    pub fn new<I, S>(config: CircuitBreakerConfig, providers: I, status: StatusLog) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config,
            breakers: providers
                .into_iter()
                .map(|name| Arc::new(Mutex::new(BreakerData::new(name.into()))))
                .collect(),
            status,
        }
    }

    /// Number of breakers (one per provider)
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Whether the provider at `index` may be used. Unknown indices are never
    /// available.
    #[must_use]
    pub fn is_available(&self, index: usize) -> bool {
        self.breakers
            .get(index)
            .is_some_and(|breaker| !breaker.lock().is_open)
    }

    /// Record a successful send, clearing the consecutive failure count.
    pub fn record_success(&self, index: usize) {
        if let Some(breaker) = self.breakers.get(index) {
            breaker.lock().consecutive_failures = 0;
        }
    }

    /// Record a failed send.
    ///
    /// Returns `true` if this failure opened the breaker. Opening schedules
    /// the reset timer, so this must be called from within a tokio runtime.
    pub fn record_failure(&self, index: usize) -> bool {
        let Some(breaker) = self.breakers.get(index) else {
            return false;
        };

        let mut data = breaker.lock();
        data.consecutive_failures = data.consecutive_failures.saturating_add(1);

        if data.is_open || data.consecutive_failures < self.config.failure_threshold {
            return false;
        }

        data.is_open = true;
        data.reset = Some(self.schedule_reset(Arc::clone(breaker)));
        let provider = data.provider.clone();
        drop(data);

        tracing::warn!(
            provider = %provider,
            threshold = self.config.failure_threshold,
            cooldown_secs = self.config.cooldown_secs,
            "Circuit breaker OPENED"
        );
        self.status.record(StatusKind::BreakerOpened { provider });

        true
    }

    fn schedule_reset(&self, breaker: Arc<Mutex<BreakerData>>) -> AbortHandle {
        let cooldown = self.config.cooldown();
        let status = self.status.clone();

        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;

            let provider = {
                let mut data = breaker.lock();
                data.is_open = false;
                data.consecutive_failures = 0;
                data.reset = None;
                data.provider.clone()
            };

            tracing::info!(provider = %provider, "Circuit breaker CLOSED after cooldown");
            status.record(StatusKind::BreakerReset { provider });
        })
        .abort_handle()
    }

    /// Snapshot of the breaker state for the provider at `index`.
    #[must_use]
    pub fn stats(&self, index: usize) -> Option<CircuitBreakerStats> {
        self.breakers.get(index).map(|breaker| {
            let data = breaker.lock();
            CircuitBreakerStats {
                is_open: data.is_open,
                consecutive_failures: data.consecutive_failures,
            }
        })
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        for breaker in &self.breakers {
            if let Some(reset) = breaker.lock().reset.take() {
                reset.abort();
            }
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub is_open: bool,
    pub consecutive_failures: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> (CircuitBreaker, StatusLog) {
        let status = StatusLog::new();
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_secs,
        };
        (
            CircuitBreaker::new(config, ["primary", "backup"], status.clone()),
            status,
        )
    }

    #[test]
    fn defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.cooldown(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold() {
        let (breaker, status) = breaker(3, 60);

        assert!(breaker.is_available(0));
        assert!(!breaker.record_failure(0));
        assert!(!breaker.record_failure(0));
        assert!(breaker.is_available(0));

        assert!(breaker.record_failure(0));
        assert!(!breaker.is_available(0));
        assert!(breaker.is_available(1), "breakers are independent");

        assert_eq!(
            status.kinds(),
            vec![StatusKind::BreakerOpened {
                provider: "primary".to_string()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failures() {
        let (breaker, _) = breaker(3, 60);

        breaker.record_failure(0);
        breaker.record_failure(0);
        breaker.record_success(0);
        assert_eq!(breaker.stats(0).unwrap().consecutive_failures, 0);

        breaker.record_failure(0);
        breaker.record_failure(0);
        assert!(breaker.is_available(0));
    }

    #[tokio::test(start_paused = true)]
    async fn resets_after_cooldown() {
        let (breaker, status) = breaker(2, 60);

        breaker.record_failure(1);
        breaker.record_failure(1);
        assert!(!breaker.is_available(1));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!breaker.is_available(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(breaker.is_available(1));
        assert_eq!(
            breaker.stats(1).unwrap(),
            CircuitBreakerStats {
                is_open: false,
                consecutive_failures: 0,
            }
        );
        assert_eq!(
            status.kinds().last(),
            Some(&StatusKind::BreakerReset {
                provider: "backup".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_while_open_do_not_reschedule() {
        let (breaker, status) = breaker(1, 10);

        assert!(breaker.record_failure(0));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!breaker.record_failure(0));
        assert_eq!(breaker.stats(0).unwrap().consecutive_failures, 2);

        // The original timer still fires at t=10s, not t=15s.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(breaker.is_available(0));

        let opened = status
            .kinds()
            .iter()
            .filter(|kind| matches!(kind, StatusKind::BreakerOpened { .. }))
            .count();
        assert_eq!(opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_while_open_keeps_breaker_open() {
        let (breaker, _) = breaker(1, 60);

        breaker.record_failure(0);
        breaker.record_success(0);

        assert_eq!(
            breaker.stats(0).unwrap(),
            CircuitBreakerStats {
                is_open: true,
                consecutive_failures: 0,
            }
        );
    }

    #[test]
    fn unknown_index_is_unavailable() {
        let (breaker, _) = breaker(3, 60);

        assert_eq!(breaker.len(), 2);
        assert!(!breaker.is_available(7));
        assert!(!breaker.record_failure(7));
        assert!(breaker.stats(7).is_none());
    }
}
