//! Backoff retrier
//!
//! Retries one provider for one message according to a [`RetryPolicy`],
//! sleeping between attempts. Only the message being retried waits; the
//! sleep suspends the current task rather than blocking the runtime.

use herald_common::Message;

use crate::{
    circuit_breaker::CircuitBreaker,
    policy::RetryPolicy,
    provider::{self, Provider},
    status::{StatusKind, StatusLog},
};

/// Executes a [`RetryPolicy`] against a single provider.
///
/// Every outcome is recorded on the provider's breaker and in the status
/// log. The breaker is not consulted before an attempt.
pub struct BackoffRetrier<'a> {
    policy: &'a RetryPolicy,
    breakers: &'a CircuitBreaker,
    status: &'a StatusLog,
}

impl<'a> BackoffRetrier<'a> {
    #[must_use]
    pub const fn new(
        policy: &'a RetryPolicy,
        breakers: &'a CircuitBreaker,
        status: &'a StatusLog,
    ) -> Self {
        Self {
            policy,
            breakers,
            status,
        }
    }

    /// Attempt `provider.send(message)` up to `max_attempts` times.
    ///
    /// Returns `true` on the first success and `false` once every attempt
    /// has failed. Provider errors never escape.
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = message.id(), provider = provider.name()))]
    pub async fn retry(&self, index: usize, provider: &dyn Provider, message: &Message) -> bool {
        let mut delays = self.policy.delays();

        for attempt_number in 1..=self.policy.max_attempts {
            match provider::attempt(provider, message).await {
                Ok(()) => {
                    self.breakers.record_success(index);
                    self.status.record(StatusKind::Sent {
                        message_id: message.id().to_string(),
                        provider: provider.name().to_string(),
                    });
                    return true;
                }
                Err(error) => {
                    tracing::debug!(attempt = attempt_number, %error, "Attempt failed");
                    self.status.record(StatusKind::SendFailed {
                        message_id: message.id().to_string(),
                        provider: provider.name().to_string(),
                        reason: error.to_string(),
                    });
                    self.breakers.record_failure(index);

                    if let Some(delay) = delays.next() {
                        self.status.record(StatusKind::RetryScheduled {
                            message_id: message.id().to_string(),
                            provider: provider.name().to_string(),
                            delay,
                        });
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.status.record(StatusKind::RetriesExhausted {
            message_id: message.id().to_string(),
            provider: provider.name().to_string(),
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::{circuit_breaker::CircuitBreakerConfig, error::SendError};

    /// Fails until `succeed_on` attempts have been made.
    #[derive(Debug)]
    struct Flaky {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl Flaky {
        const fn new(succeed_on: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on,
            }
        }
    }

    #[async_trait]
    impl Provider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _message: &Message) -> Result<(), SendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(())
            } else {
                Err(SendError::Unavailable(format!("call {call}")))
            }
        }
    }

    fn message() -> Message {
        Message::with_id("m1", "test@example.com", "Test", "Hello!")
    }

    fn fixtures(threshold: u32) -> (RetryPolicy, CircuitBreaker, StatusLog) {
        let status = StatusLog::new();
        let breakers = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_secs: 60,
            },
            ["flaky"],
            status.clone(),
        );
        (RetryPolicy::default(), breakers, status)
    }

    /// The paused clock may round each timer up to the next millisecond.
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {elapsed:?}"
        );
    }

    fn scheduled_delays(status: &StatusLog) -> Vec<Duration> {
        status
            .kinds()
            .into_iter()
            .filter_map(|kind| match kind {
                StatusKind::RetryScheduled { delay, .. } => Some(delay),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially_then_gives_up() {
        let (policy, breakers, status) = fixtures(10);
        let provider = Flaky::new(u32::MAX);
        let retrier = BackoffRetrier::new(&policy, &breakers, &status);

        let start = Instant::now();
        assert!(!retrier.retry(0, &provider, &message()).await);

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            scheduled_delays(&status),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_elapsed(start, Duration::from_millis(3000));
        assert!(matches!(
            status.kinds().last(),
            Some(StatusKind::RetriesExhausted { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success() {
        let (policy, breakers, status) = fixtures(10);
        let provider = Flaky::new(2);
        let retrier = BackoffRetrier::new(&policy, &breakers, &status);

        let start = Instant::now();
        assert!(retrier.retry(0, &provider, &message()).await);

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_elapsed(start, Duration::from_millis(1000));
        assert_eq!(breakers.stats(0).map(|s| s.consecutive_failures), Some(0));
        assert_eq!(
            status.kinds().last(),
            Some(&StatusKind::Sent {
                message_id: "m1".to_string(),
                provider: "flaky".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_feed_the_breaker() {
        let (policy, breakers, status) = fixtures(2);
        let provider = Flaky::new(u32::MAX);
        let retrier = BackoffRetrier::new(&policy, &breakers, &status);

        assert!(!retrier.retry(0, &provider, &message()).await);

        // Breaker is ignored by the retrier: all three attempts were made.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(!breakers.is_available(0));
    }
}
