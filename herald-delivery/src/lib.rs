//! Resilient message dispatch
//!
//! This crate provides functionality to:
//! - Serialise submitted messages through a single FIFO drain task
//! - Deduplicate messages and enforce a global acceptance ceiling
//! - Retry failed sends with exponential backoff
//! - Fail over to the next provider when retries are exhausted
//! - Trip per-provider circuit breakers that reset after a cooldown
//! - Record every transition in an append-only status log

mod circuit_breaker;
mod config;
mod coordinator;
mod error;
pub mod policy;
pub mod provider;
pub mod queue;
mod rate_limiter;
mod retrier;
mod status;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
pub use config::DispatchConfig;
pub use coordinator::DeliveryCoordinator;
pub use error::{ConfigError, DeliveryError, QueueError, SendError};
pub use herald_common::Message;
pub use policy::RetryPolicy;
pub use provider::{MockProvider, MockProviderConfig, Provider};
pub use queue::DispatchQueue;
pub use rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use retrier::BackoffRetrier;
pub use status::{StatusEvent, StatusKind, StatusLog, StatusSink};
