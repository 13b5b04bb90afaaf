//! Append-only status log
//!
//! Every significant transition a message or provider goes through is
//! recorded here as a [`StatusEvent`]: acceptance, rejection, each send
//! attempt, retry scheduling, failover and circuit breaker changes.
//!
//! The log is the only observability channel the dispatcher offers to its
//! callers. Events are numbered in the order they were appended, so two
//! events can always be ordered even when their timestamps collide.
//! Additional [`StatusSink`]s can be attached to observe events as they are
//! recorded.

use std::{
    fmt::{self, Display},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Accepted {
        message_id: String,
    },
    RateLimited {
        message_id: String,
    },
    Duplicate {
        message_id: String,
    },
    /// The current provider's breaker was open when the message reached it.
    BreakerRejected {
        message_id: String,
        provider: String,
    },
    Sent {
        message_id: String,
        provider: String,
    },
    SendFailed {
        message_id: String,
        provider: String,
        reason: String,
    },
    RetryScheduled {
        message_id: String,
        provider: String,
        delay: Duration,
    },
    RetriesExhausted {
        message_id: String,
        provider: String,
    },
    Failover {
        message_id: String,
        from: String,
        to: String,
    },
    BreakerOpened {
        provider: String,
    },
    BreakerReset {
        provider: String,
    },
}

impl StatusKind {
    /// The message this event concerns, if any.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { message_id }
            | Self::RateLimited { message_id }
            | Self::Duplicate { message_id }
            | Self::BreakerRejected { message_id, .. }
            | Self::Sent { message_id, .. }
            | Self::SendFailed { message_id, .. }
            | Self::RetryScheduled { message_id, .. }
            | Self::RetriesExhausted { message_id, .. }
            | Self::Failover { message_id, .. } => Some(message_id),
            Self::BreakerOpened { .. } | Self::BreakerReset { .. } => None,
        }
    }

    /// The provider a send attempt was made through.
    #[must_use]
    pub fn attempted_provider(&self) -> Option<&str> {
        match self {
            Self::Sent { provider, .. } | Self::SendFailed { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

impl Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { message_id } => write!(f, "Message {message_id} accepted."),
            Self::RateLimited { message_id } => {
                write!(f, "Rate limit exceeded for message {message_id}.")
            }
            Self::Duplicate { message_id } => write!(
                f,
                "Duplicate message detected for {message_id}. Skipping send."
            ),
            Self::BreakerRejected {
                message_id,
                provider,
            } => write!(
                f,
                "Circuit breaker open for {provider}, not sending message {message_id}."
            ),
            Self::Sent {
                message_id,
                provider,
            } => write!(f, "Message {message_id} sent successfully via {provider}."),
            Self::SendFailed {
                message_id,
                provider,
                reason,
            } => write!(
                f,
                "Failed to send message {message_id} via {provider}: {reason}"
            ),
            Self::RetryScheduled {
                message_id,
                provider,
                delay,
            } => write!(
                f,
                "Retrying message {message_id} via {provider} in {}ms...",
                delay.as_millis()
            ),
            Self::RetriesExhausted {
                message_id,
                provider,
            } => write!(
                f,
                "Exhausted all retries for message {message_id} via {provider}."
            ),
            Self::Failover {
                message_id,
                from,
                to,
            } => write!(
                f,
                "Switching message {message_id} from {from} to {to}."
            ),
            Self::BreakerOpened { provider } => {
                write!(f, "Circuit breaker opened for {provider}.")
            }
            Self::BreakerReset { provider } => write!(f, "Circuit breaker reset for {provider}."),
        }
    }
}

/// A single entry in the status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Position in the log, starting at zero.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: StatusKind,
}

impl StatusEvent {
    fn emit(&self) {
        let sequence = self.sequence;
        match &self.kind {
            StatusKind::SendFailed {
                message_id,
                provider,
                reason,
            } => warn!(sequence, message_id, provider, reason, "{}", self.kind),
            StatusKind::RateLimited { message_id } | StatusKind::Duplicate { message_id } => {
                warn!(sequence, message_id, "{}", self.kind);
            }
            StatusKind::RetriesExhausted {
                message_id,
                provider,
            }
            | StatusKind::BreakerRejected {
                message_id,
                provider,
            } => warn!(sequence, message_id, provider, "{}", self.kind),
            StatusKind::BreakerOpened { provider } => warn!(sequence, provider, "{}", self.kind),
            StatusKind::Sent {
                message_id,
                provider,
            } => info!(sequence, message_id, provider, "{}", self.kind),
            StatusKind::BreakerReset { provider } => info!(sequence, provider, "{}", self.kind),
            StatusKind::Failover { message_id, .. }
            | StatusKind::Accepted { message_id }
            | StatusKind::RetryScheduled { message_id, .. } => {
                debug!(sequence, message_id, "{}", self.kind);
            }
        }
    }
}

impl Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] #{} {}",
            self.timestamp.to_rfc3339(),
            self.sequence,
            self.kind
        )
    }
}

/// Observer notified of every status event, in log order.
pub trait StatusSink: Send + Sync + fmt::Debug {
    fn record(&self, event: &StatusEvent);
}

#[derive(Debug, Default)]
struct Inner {
    /// Held across append and notification so sinks observe log order.
    writer: Mutex<()>,
    entries: RwLock<Vec<StatusEvent>>,
    sinks: Vec<Arc<dyn StatusSink>>,
}

/// Shared handle to an append-only status log.
///
/// Cloning the handle shares the underlying log.
#[derive(Debug, Clone, Default)]
pub struct StatusLog {
    inner: Arc<Inner>,
}

impl StatusLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that also forwards every event to `sinks`.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                writer: Mutex::default(),
                entries: RwLock::default(),
                sinks,
            }),
        }
    }

    /// Append an event and notify the attached sinks.
    ///
    /// Recording is serialised: sinks see events in sequence order, and a
    /// sink must not record into the log it is attached to.
    pub fn record(&self, kind: StatusKind) {
        let _writer = self.inner.writer.lock();

        let event = {
            let mut entries = self.inner.entries.write();
            let event = StatusEvent {
                sequence: entries.len() as u64,
                timestamp: Utc::now(),
                kind,
            };
            entries.push(event.clone());
            event
        };

        event.emit();
        for sink in &self.inner.sinks {
            sink.record(&event);
        }
    }

    /// Snapshot of every event recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<StatusEvent> {
        self.inner.entries.read().clone()
    }

    /// Snapshot of the event kinds recorded so far, oldest first.
    #[must_use]
    pub fn kinds(&self) -> Vec<StatusKind> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|event| event.kind.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }
}
