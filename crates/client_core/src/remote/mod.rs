//! The seam between a session and wherever the shared document lives.

use async_trait::async_trait;
use serde_json::Value;
use shared::protocol::DocumentPath;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::RemoteError;

mod memory;
mod relay;

pub use memory::MemoryDocumentStore;
pub use relay::{RelayDocumentStore, API_KEY_HEADER};

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Whole document after a change, including echoes of our own writes.
    /// `None` when nothing is stored.
    Snapshot(Option<Value>),
    Failed(RemoteError),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a standing subscription. The current value arrives as the first
    /// event.
    async fn subscribe(&self, path: &str) -> Result<Subscription, RemoteError>;
    /// Replaces the whole document at `path`. Later writes win.
    async fn publish(&self, path: &str, value: Value) -> Result<(), RemoteError>;
}

/// Receiving end of a subscription. Dropping it cancels.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<RemoteEvent>,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl Subscription {
    /// `task` is the forwarder feeding `events`, if the store runs one.
    pub fn new(events: mpsc::UnboundedReceiver<RemoteEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            events,
            task,
            cancelled: false,
        }
    }

    /// `None` once the subscription is cancelled or the store hung up.
    pub async fn next(&mut self) -> Option<RemoteEvent> {
        if self.cancelled {
            return None;
        }
        self.events.recv().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Idempotent. Nothing is delivered after this returns, even events that
    /// were already buffered.
    pub fn unsubscribe(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

pub(crate) fn document_path(raw: &str) -> Result<DocumentPath, RemoteError> {
    DocumentPath::parse(raw).map_err(|err| RemoteError::Rejected(err.message))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
