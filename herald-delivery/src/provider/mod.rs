//! Delivery provider contract
//!
//! A provider is anything that can hand a [`Message`] to the outside world:
//! an SMTP relay, an HTTP mail API, a test double. The dispatcher only needs
//! a stable display name and a retryable `send`.

pub mod mock;

use std::{any::Any, panic::AssertUnwindSafe};

use async_trait::async_trait;
use futures_util::FutureExt;
use herald_common::Message;

use crate::error::SendError;

pub use mock::{MockProvider, MockProviderConfig};

#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Stable display name, used in status events and logs.
    fn name(&self) -> &str;

    /// Attempt delivery of one message.
    ///
    /// May be called several times for the same message; deduplication is
    /// the coordinator's job, not the provider's.
    async fn send(&self, message: &Message) -> Result<(), SendError>;
}

/// Call `provider.send`, converting a panic inside the send future into a
/// [`SendError::Panicked`].
pub(crate) async fn attempt(provider: &dyn Provider, message: &Message) -> Result<(), SendError> {
    match AssertUnwindSafe(provider.send(message)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(SendError::Panicked(panic_reason(payload.as_ref()))),
    }
}

pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|reason| (*reason).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
