//! Dispatch queue
//!
//! Serialises delivery: any number of producers may submit messages
//! concurrently, but a single drain task hands them to the coordinator one
//! at a time, in submission order, waiting for each delivery (retries and
//! failover included) to resolve before starting the next.
//!
//! A provider that never returns therefore stalls the whole queue; there is
//! no per-message timeout and no cancellation. A delivery that panics (in a
//! status sink, say) is logged and counted as resolved.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures_util::FutureExt;
use herald_common::{Message, dispatch, internal};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{coordinator::DeliveryCoordinator, error::QueueError, provider::panic_reason};

#[derive(Debug)]
struct QueueState {
    /// Messages submitted but not yet resolved
    outstanding: watch::Sender<usize>,
    /// Whether any submitted message is still unresolved
    draining: AtomicBool,
}

impl QueueState {
    fn submitted(&self) {
        self.outstanding.send_modify(|count| {
            *count += 1;
            self.draining.store(true, Ordering::Release);
        });
    }

    fn resolved(&self) {
        self.outstanding.send_modify(|count| {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.draining.store(false, Ordering::Release);
            }
        });
    }
}

/// FIFO queue draining into a [`DeliveryCoordinator`].
#[derive(Debug)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Message>,
    state: Arc<QueueState>,
    coordinator: Arc<DeliveryCoordinator>,
    worker: JoinHandle<()>,
}

impl DispatchQueue {
    /// Spawn the drain task. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(coordinator: Arc<DeliveryCoordinator>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0);
        let state = Arc::new(QueueState {
            outstanding,
            draining: AtomicBool::new(false),
        });

        let worker = tokio::spawn(drain(
            receiver,
            Arc::clone(&coordinator),
            Arc::clone(&state),
        ));

        Self {
            sender,
            state,
            coordinator,
            worker,
        }
    }

    /// Submit a message for delivery and return immediately.
    ///
    /// The outcome is only observable through the coordinator's status log.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the drain task has stopped.
    pub fn enqueue(&self, message: Message) -> Result<(), QueueError> {
        self.state.submitted();

        self.sender.send(message).map_err(|_| {
            self.state.resolved();
            QueueError::Closed
        })
    }

    /// Messages submitted but not yet resolved, including the one in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        *self.state.outstanding.borrow()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any submitted message is buffered or in flight.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.state.draining.load(Ordering::Acquire)
    }

    /// Wait until every message submitted so far has been resolved.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.state.outstanding.subscribe();
        // The sender lives in `self.state`, so this cannot observe a closed channel.
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    #[must_use]
    pub const fn coordinator(&self) -> &Arc<DeliveryCoordinator> {
        &self.coordinator
    }

    /// Stop accepting messages, finish the ones already submitted and join
    /// the drain task.
    pub async fn shutdown(self) {
        internal!("Dispatch queue shutting down with {} outstanding", self.len());
        drop(self.sender);

        if let Err(err) = self.worker.await {
            tracing::error!(error = %err, "Dispatch queue drain task failed");
        }
    }
}

#[tracing::instrument(level = "trace", skip_all)]
async fn drain(
    mut receiver: mpsc::UnboundedReceiver<Message>,
    coordinator: Arc<DeliveryCoordinator>,
    state: Arc<QueueState>,
) {
    internal!("Dispatch queue drain task started");

    while let Some(message) = receiver.recv().await {
        dispatch!("Draining message {}", message.id());

        match AssertUnwindSafe(coordinator.deliver(&message))
            .catch_unwind()
            .await
        {
            Ok(delivered) => {
                dispatch!("Message {} resolved, delivered: {}", message.id(), delivered);
            }
            Err(payload) => tracing::error!(
                message_id = message.id(),
                reason = %panic_reason(payload.as_ref()),
                "Delivery panicked, moving on to the next message"
            ),
        }

        state.resolved();
    }

    state.draining.store(false, Ordering::Release);
    internal!("Dispatch queue drain task stopped");
}
