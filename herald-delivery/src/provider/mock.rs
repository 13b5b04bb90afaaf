use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use herald_common::Message;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Provider, error::SendError};

const fn default_failure_rate() -> f64 {
    0.5
}

/// Configuration for a [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockProviderConfig {
    pub name: String,

    /// Probability in `[0, 1]` that a send fails
    ///
    /// Default: 0.5
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

/// A provider that fails at random with a fixed probability.
///
/// Stands in for a real relay when running the dispatcher without one.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    failure_rate: f64,
    sends: AtomicU64,
}

impl MockProvider {
    /// Create a mock provider. The failure rate is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(name: impl Into<String>, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            default_failure_rate()
        } else {
            failure_rate.clamp(0.0, 1.0)
        };

        Self {
            name: name.into(),
            failure_rate,
            sends: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Number of times `send` has been called
    #[must_use]
    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::Relaxed)
    }
}

impl From<&MockProviderConfig> for MockProvider {
    fn from(config: &MockProviderConfig) -> Self {
        Self::new(config.name.clone(), config.failure_rate)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        self.sends.fetch_add(1, Ordering::Relaxed);

        if rand::rng().random_bool(self.failure_rate) {
            return Err(SendError::Unavailable(format!(
                "{} failed to send message",
                self.name
            )));
        }

        tracing::debug!(
            provider = %self.name,
            message_id = message.id(),
            recipient = message.recipient(),
            "Mock provider accepted message"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::with_id("1", "test@example.com", "Test", "Hello!")
    }

    #[tokio::test]
    async fn never_failing() {
        let provider = MockProvider::new("Provider1", 0.0);

        for _ in 0..50 {
            assert!(provider.send(&message()).await.is_ok());
        }
        assert_eq!(provider.sends(), 50);
    }

    #[tokio::test]
    async fn always_failing() {
        let provider = MockProvider::new("Provider2", 1.0);

        let error = provider.send(&message()).await.unwrap_err();
        assert_eq!(
            error,
            SendError::Unavailable("Provider2 failed to send message".to_string())
        );
    }

    #[test]
    fn failure_rate_is_clamped() {
        assert!((MockProvider::new("a", 3.0).failure_rate() - 1.0).abs() < f64::EPSILON);
        assert!(MockProvider::new("b", -1.0).failure_rate().abs() < f64::EPSILON);
        assert!((MockProvider::new("c", f64::NAN).failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn built_from_config() {
        let config = MockProviderConfig {
            name: "Provider1".to_string(),
            failure_rate: 0.25,
        };
        let provider = MockProvider::from(&config);

        assert_eq!(provider.name(), "Provider1");
        assert!((provider.failure_rate() - 0.25).abs() < f64::EPSILON);
    }
}
