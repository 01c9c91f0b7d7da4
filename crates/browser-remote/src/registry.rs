//! Correlation registry - routes native responses back to waiting requests.
//!
//! Each in-flight request owns a [`PendingResponse`]: a one-shot slot keyed by a
//! fresh [`CorrelationId`]. The inbound dispatcher fulfils the slot at most once;
//! dropping the `PendingResponse` removes the entry, so every exit path (answer,
//! timeout, error, client disconnect) leaves the registry clean.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

use crate::bridge::MessageHandler;
use crate::bridge::protocol::{CorrelationId, MessageFromNative};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("correlation id {0} is already registered")]
    Duplicate(CorrelationId),
}

/// Concurrent map from correlation id to response slot.
///
/// The slot is `None` once fulfilled; the entry itself stays until the waiter
/// forgets it.
pub struct CorrelationRegistry {
    slots: DashMap<CorrelationId, Option<oneshot::Sender<MessageFromNative>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: DashMap::new(),
        })
    }

    /// Create a response slot under `id`.
    pub fn register(self: &Arc<Self>, id: CorrelationId) -> Result<PendingResponse, RegistryError> {
        match self.slots.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(id)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(Some(tx));
                tracing::trace!(%id, "Registered pending response");
                Ok(PendingResponse {
                    id,
                    rx,
                    registry: Arc::clone(self),
                })
            }
        }
    }

    /// Mint a fresh id and register it.
    pub fn register_new(self: &Arc<Self>) -> PendingResponse {
        loop {
            match self.register(CorrelationId::new()) {
                Ok(pending) => return pending,
                Err(e) => tracing::warn!(error = %e, "Correlation id collision, retrying"),
            }
        }
    }

    /// Hand `message` to the slot named by its id.
    ///
    /// Returns whether a waiter received it. Unknown, expired, already
    /// fulfilled and empty ids are dropped.
    pub fn deliver(&self, message: MessageFromNative) -> bool {
        let Some(raw_id) = message.correlation_id() else {
            tracing::trace!(status = %message.status, "Ignoring uncorrelated message");
            return false;
        };
        let Ok(id) = CorrelationId::parse(raw_id) else {
            tracing::trace!(id = %raw_id, "Ignoring message with unknown id");
            return false;
        };

        let sender = self.slots.get_mut(&id).and_then(|mut slot| slot.take());
        match sender {
            Some(tx) => {
                tracing::trace!(%id, "Message received from native peer for id");
                if tx.send(message).is_err() {
                    tracing::trace!(%id, "Waiter gave up before delivery");
                    return false;
                }
                true
            }
            None => {
                tracing::trace!(%id, "No pending request for id, dropping message");
                false
            }
        }
    }

    /// Remove the entry for `id`, fulfilled or not.
    pub fn forget(&self, id: &CorrelationId) -> bool {
        self.slots.remove(id).is_some()
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl MessageHandler<MessageFromNative> for CorrelationRegistry {
    fn handle_message(&self, message: MessageFromNative) {
        self.deliver(message);
    }
}

/// How a wait on a pending response ended.
#[derive(Debug)]
pub enum WaitOutcome {
    Responded(MessageFromNative),
    TimedOut,
    /// The slot was removed from under the waiter; no answer can arrive.
    Abandoned,
}

/// A registered response slot. Forgets its entry on drop.
pub struct PendingResponse {
    id: CorrelationId,
    rx: oneshot::Receiver<MessageFromNative>,
    registry: Arc<CorrelationRegistry>,
}

impl PendingResponse {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Race the response slot against `deadline`.
    pub async fn wait<F>(&mut self, deadline: F) -> WaitOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;

            response = &mut self.rx => match response {
                Ok(message) => WaitOutcome::Responded(message),
                Err(_) => WaitOutcome::Abandoned,
            },
            _ = deadline => WaitOutcome::TimedOut,
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.registry.forget(&self.id) {
            tracing::trace!(id = %self.id, "Forgot pending response");
        }
    }
}
