//! Test doubles shared by the integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_delivery::{DeliveryCoordinator, DispatchConfig, Message, Provider, SendError};
use parking_lot::Mutex;

/// How a [`ScriptedProvider`] answers.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    AlwaysSucceed,
    AlwaysFail,
    /// Fail the first `n` calls, then succeed.
    FailFirst(u32),
    Panic,
}

/// Every send attempt across all providers sharing the journal, in order.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(String, String)>>>);

impl Journal {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.0.lock().clone()
    }

    /// Message ids in the order they were first attempted.
    pub fn first_attempts(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, message_id) in self.0.lock().iter() {
            if !seen.contains(message_id) {
                seen.push(message_id.clone());
            }
        }
        seen
    }
}

/// Provider that follows a [`Script`] and counts its calls.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: Script,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    journal: Journal,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script) -> Arc<Self> {
        Self::build(name, script, Duration::ZERO, Journal::default())
    }

    pub fn build(name: &str, script: Script, latency: Duration, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script,
            latency,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            journal,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `send` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal
            .0
            .lock()
            .push((self.name.clone(), message.id().to_string()));

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.script {
            Script::AlwaysSucceed => Ok(()),
            Script::AlwaysFail => Err(SendError::Unavailable(format!("{} is down", self.name))),
            Script::FailFirst(n) if call <= n => {
                Err(SendError::Unavailable(format!("{} is warming up", self.name)))
            }
            Script::FailFirst(_) => Ok(()),
            Script::Panic => panic!("{} exploded", self.name),
        }
    }
}

pub fn message(id: &str) -> Message {
    Message::with_id(id, "test@example.com", "Test", "Hello!")
}

pub fn coordinator(config: DispatchConfig, providers: &[Arc<ScriptedProvider>]) -> DeliveryCoordinator {
    let providers = providers
        .iter()
        .map(|provider| Arc::clone(provider) as Arc<dyn Provider>)
        .collect();

    DeliveryCoordinator::new(config, providers).expect("valid coordinator")
}
