//! Delivery coordinator
//!
//! Runs the delivery protocol for a single message:
//!
//! 1. **Rate check**: refuse once the acceptance ceiling is reached
//! 2. **Idempotency**: refuse ids that have already been accepted
//! 3. **Accept**: remember the id and consume one unit of the ceiling
//! 4. **Breaker check**: refuse if the current provider's breaker is open
//! 5. **Primary attempt**: one direct send through the current provider
//! 6. **Retry**: back off and retry the same provider
//! 7. **Failover**: advance to the next provider and retry there
//!
//! Acceptance happens before any send and is never rolled back, so a
//! message id is consumed even if every provider ultimately fails. The
//! provider cursor only moves forward: after a failover, later messages start
//! from the provider that was failed over to.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use ahash::AHashSet;
use herald_common::{Message, internal};
use parking_lot::Mutex;

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerStats},
    config::DispatchConfig,
    error::{ConfigError, DeliveryError},
    provider::{self, Provider},
    rate_limiter::{RateLimitStats, RateLimiter},
    retrier::BackoffRetrier,
    status::{StatusEvent, StatusKind, StatusLog},
};

/// State checked and updated when a message is admitted.
#[derive(Debug)]
struct Admission {
    limiter: RateLimiter,
    /// Ids accepted so far. Never evicted.
    delivered: AHashSet<String>,
}

/// Delivers messages through an ordered set of providers.
///
/// All mutable state (breakers, accepted ids, rate counter and provider
/// cursor) belongs to the coordinator; two coordinators never share any.
#[derive(Debug)]
pub struct DeliveryCoordinator {
    config: DispatchConfig,
    providers: Vec<Arc<dyn Provider>>,
    current: AtomicUsize,
    breakers: CircuitBreaker,
    admission: Mutex<Admission>,
    status: StatusLog,
}

impl DeliveryCoordinator {
    /// Create a coordinator with its own, fresh status log.
    ///
    /// # Errors
    ///
    /// Returns an error if `providers` is empty or the configuration is invalid.
    pub fn new(
        config: DispatchConfig,
        providers: Vec<Arc<dyn Provider>>,
    ) -> Result<Self, ConfigError> {
        Self::with_status_log(config, providers, StatusLog::new())
    }

    /// Create a coordinator that records into `status`, which may have
    /// additional sinks attached.
    ///
    /// # Errors
    ///
    /// Returns an error if `providers` is empty or the configuration is invalid.
    pub fn with_status_log(
        config: DispatchConfig,
        providers: Vec<Arc<dyn Provider>>,
        status: StatusLog,
    ) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        config.validate()?;

        let breakers = CircuitBreaker::new(
            config.circuit_breaker.clone(),
            providers.iter().map(|provider| provider.name().to_string()),
            status.clone(),
        );

        internal!(
            "Delivery coordinator ready with {} provider(s), ceiling {}",
            providers.len(),
            config.rate_limit.ceiling
        );

        Ok(Self {
            admission: Mutex::new(Admission {
                limiter: RateLimiter::new(config.rate_limit.clone()),
                delivered: AHashSet::default(),
            }),
            config,
            providers,
            current: AtomicUsize::new(0),
            breakers,
            status,
        })
    }

    /// Deliver one message, returning whether it was sent.
    ///
    /// Every reason for failure is recorded in the status log.
    pub async fn deliver(&self, message: &Message) -> bool {
        self.try_deliver(message).await.is_ok()
    }

    /// Deliver one message, returning the name of the provider that sent it.
    ///
    /// # Errors
    ///
    /// Returns why the message was refused or could not be sent. The same
    /// detail is also recorded in the status log.
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = message.id()))]
    pub async fn try_deliver(&self, message: &Message) -> Result<String, DeliveryError> {
        self.admit(message)?;

        let index = self.current.load(Ordering::Acquire);
        let provider = self.providers[index].as_ref();

        if !self.breakers.is_available(index) {
            self.status.record(StatusKind::BreakerRejected {
                message_id: message.id().to_string(),
                provider: provider.name().to_string(),
            });
            return Err(DeliveryError::BreakerOpen {
                provider: provider.name().to_string(),
            });
        }

        match provider::attempt(provider, message).await {
            Ok(()) => {
                self.breakers.record_success(index);
                self.status.record(StatusKind::Sent {
                    message_id: message.id().to_string(),
                    provider: provider.name().to_string(),
                });
                return Ok(provider.name().to_string());
            }
            Err(error) => {
                self.status.record(StatusKind::SendFailed {
                    message_id: message.id().to_string(),
                    provider: provider.name().to_string(),
                    reason: error.to_string(),
                });
                self.breakers.record_failure(index);
            }
        }

        let retrier = BackoffRetrier::new(&self.config.retry, &self.breakers, &self.status);
        if retrier.retry(index, provider, message).await {
            return Ok(provider.name().to_string());
        }

        let next = (index + 1) % self.providers.len();
        self.current.store(next, Ordering::Release);
        let fallback = self.providers[next].as_ref();

        self.status.record(StatusKind::Failover {
            message_id: message.id().to_string(),
            from: provider.name().to_string(),
            to: fallback.name().to_string(),
        });

        if retrier.retry(next, fallback, message).await {
            Ok(fallback.name().to_string())
        } else {
            Err(DeliveryError::AllBackendsExhausted {
                message_id: message.id().to_string(),
                last_provider: fallback.name().to_string(),
            })
        }
    }

    /// Rate check, idempotency check and acceptance, as one atomic step.
    fn admit(&self, message: &Message) -> Result<(), DeliveryError> {
        let mut admission = self.admission.lock();

        if let Err(ceiling) = admission.limiter.check() {
            drop(admission);
            self.status.record(StatusKind::RateLimited {
                message_id: message.id().to_string(),
            });
            return Err(DeliveryError::RateLimited {
                message_id: message.id().to_string(),
                ceiling,
            });
        }

        if admission.delivered.contains(message.id()) {
            drop(admission);
            self.status.record(StatusKind::Duplicate {
                message_id: message.id().to_string(),
            });
            return Err(DeliveryError::Duplicate {
                message_id: message.id().to_string(),
            });
        }

        admission.delivered.insert(message.id().to_string());
        admission.limiter.consume();
        drop(admission);

        self.status.record(StatusKind::Accepted {
            message_id: message.id().to_string(),
        });
        Ok(())
    }

    /// Snapshot of the full status log, oldest first.
    #[must_use]
    pub fn status_log(&self) -> Vec<StatusEvent> {
        self.status.entries()
    }

    /// Shared handle to the status log.
    #[must_use]
    pub const fn status(&self) -> &StatusLog {
        &self.status
    }

    /// Index of the provider the next message will be tried on first.
    #[must_use]
    pub fn current_provider(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn provider_name(&self, index: usize) -> Option<&str> {
        self.providers.get(index).map(|provider| provider.name())
    }

    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_available(&self, index: usize) -> bool {
        self.breakers.is_available(index)
    }

    #[must_use]
    pub fn breaker_stats(&self, index: usize) -> Option<CircuitBreakerStats> {
        self.breakers.stats(index)
    }

    #[must_use]
    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.admission.lock().limiter.stats()
    }

    /// Messages accepted so far, whatever their outcome.
    #[must_use]
    pub fn accepted_count(&self) -> u64 {
        self.rate_limit_stats().accepted
    }

    /// Whether a message with this id has been accepted.
    #[must_use]
    pub fn has_accepted(&self, message_id: &str) -> bool {
        self.admission.lock().delivered.contains(message_id)
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }
}
