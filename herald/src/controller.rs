use std::{path::Path, sync::Arc};

use anyhow::Context;
use herald_common::{Message, internal};
use herald_delivery::{
    ConfigError, DeliveryCoordinator, DispatchConfig, DispatchQueue, MockProvider,
    MockProviderConfig, Provider, StatusEvent,
};
use serde::{Deserialize, Serialize};

fn default_providers() -> Vec<MockProviderConfig> {
    ["primary", "secondary"]
        .into_iter()
        .map(|name| MockProviderConfig {
            name: name.to_string(),
            failure_rate: 0.5,
        })
        .collect()
}

/// A whole dispatcher: its tuning and the providers it delivers through.
///
/// ```toml
/// [dispatch.rate_limit]
/// ceiling = 5
///
/// [[providers]]
/// name = "primary"
/// failure_rate = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Herald {
    #[serde(default)]
    dispatch: DispatchConfig,
    #[serde(alias = "provider", default = "default_providers")]
    providers: Vec<MockProviderConfig>,
}

impl Default for Herald {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Herald {
    /// Parse a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or does not
    /// describe a valid dispatcher.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let herald: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        herald.dispatch.validate()?;
        if herald.providers.is_empty() {
            return Err(ConfigError::NoProviders.into());
        }

        Ok(herald)
    }

    /// Read and parse the TOML configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("In {}", path.display()))
    }

    pub const fn dispatch(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub fn providers(&self) -> &[MockProviderConfig] {
        &self.providers
    }

    /// Build a fresh coordinator over mock providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn coordinator(&self) -> Result<DeliveryCoordinator, ConfigError> {
        let providers = self
            .providers
            .iter()
            .map(|config| Arc::new(MockProvider::from(config)) as Arc<dyn Provider>)
            .collect();

        DeliveryCoordinator::new(self.dispatch.clone(), providers)
    }

    /// Submit `messages` generated messages, followed by a resubmission of
    /// the first, wait for all of them to resolve and return the status log.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher cannot be built or the queue
    /// closes early.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn run(self, messages: usize) -> anyhow::Result<Vec<StatusEvent>> {
        let coordinator = Arc::new(self.coordinator()?);
        let queue = DispatchQueue::start(Arc::clone(&coordinator));

        let batch: Vec<Message> = (1..=messages)
            .map(|n| {
                Message::new(
                    format!("user{n}@example.com"),
                    format!("Message {n}"),
                    "Hello from herald!",
                )
            })
            .collect();

        for message in &batch {
            queue.enqueue(message.clone())?;
        }
        if let Some(first) = batch.first() {
            queue.enqueue(first.clone())?;
        }

        internal!("Submitted {} message(s), waiting for the queue", queue.len());
        queue.wait_idle().await;
        queue.shutdown().await;

        Ok(coordinator.status_log())
    }
}
