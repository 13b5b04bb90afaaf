//! Typed error handling for dispatch operations.
//!
//! This module distinguishes between:
//! - Per-attempt provider failures ([`SendError`])
//! - Reasons a message was not delivered ([`DeliveryError`]). Intermediate
//!   steps such as a single provider running out of retries are status
//!   events, not errors.
//! - Invalid construction parameters ([`ConfigError`])
//! - Queue ingress failures ([`QueueError`])
//!
//! None of these cross [`DeliveryCoordinator::deliver`](crate::DeliveryCoordinator::deliver);
//! it reports a boolean and records the detail in the status log.

use thiserror::Error;

/// Failure reported by a single provider `send` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The provider refused the message.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or is temporarily unable to send.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The provider's send future panicked.
    #[error("provider panicked: {0}")]
    Panicked(String),
}

/// Why a message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The global acceptance ceiling has been reached.
    #[error("rate limit of {ceiling} accepted messages reached, rejecting {message_id}")]
    RateLimited { message_id: String, ceiling: u64 },

    /// A message with this id has already been accepted.
    #[error("duplicate message {message_id}")]
    Duplicate { message_id: String },

    /// The current provider's circuit breaker is open.
    #[error("circuit breaker open for {provider}")]
    BreakerOpen { provider: String },

    /// Retries were exhausted on the original provider and on the provider
    /// it failed over to.
    #[error("all providers exhausted for {message_id}, last tried {last_provider}")]
    AllBackendsExhausted {
        message_id: String,
        last_provider: String,
    },
}

impl DeliveryError {
    /// Returns `true` if the message was refused before any send was attempted.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Duplicate { .. } | Self::BreakerOpen { .. }
        )
    }
}

/// Invalid dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A coordinator needs at least one provider to rotate through.
    #[error("at least one provider must be registered")]
    NoProviders,

    /// A configuration value is out of range.
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failure submitting to the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The drain task has stopped and no longer accepts messages.
    #[error("dispatch queue is closed")]
    Closed,
}
