use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::{document_path, DocumentStore, RemoteEvent, Subscription};
use crate::error::RemoteError;

/// In-process store. Every write is echoed to all subscribers of its path.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<RemoteEvent>>>,
    publishes: usize,
    unreachable: bool,
}

impl MemoryInner {
    fn notify(&mut self, path: &str, event: RemoteEvent) {
        if let Some(senders) = self.subscribers.get_mut(path) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(path: &str, value: Value) -> Self {
        let store = Self::default();
        store.lock().documents.insert(path.to_string(), value);
        store
    }

    /// Publishes accepted through [`DocumentStore::publish`].
    pub fn publish_count(&self) -> usize {
        self.lock().publishes
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.lock().documents.get(path).cloned()
    }

    /// Live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.lock()
            .subscribers
            .get(path)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// While unreachable, new calls fail and existing subscribers are told once.
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut inner = self.lock();
        if unreachable && !inner.unreachable {
            let paths: Vec<String> = inner.subscribers.keys().cloned().collect();
            for path in paths {
                inner.notify(&path, RemoteEvent::Failed(unreachable_error()));
            }
        }
        inner.unreachable = unreachable;
    }

    /// Write from some other client. Not counted as a publish.
    pub fn write_external(&self, path: &str, value: Option<Value>) {
        let mut inner = self.lock();
        match &value {
            Some(value) => inner.documents.insert(path.to_string(), value.clone()),
            None => inner.documents.remove(path),
        };
        inner.notify(path, RemoteEvent::Snapshot(value));
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, path: &str) -> Result<Subscription, RemoteError> {
        let path = document_path(path)?;
        let mut inner = self.lock();
        if inner.unreachable {
            return Err(unreachable_error());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let current = inner.documents.get(path.as_str()).cloned();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(RemoteEvent::Snapshot(current));
        inner
            .subscribers
            .entry(path.as_str().to_string())
            .or_default()
            .push(tx);
        debug!(%path, "memory subscription opened");
        Ok(Subscription::new(rx, None))
    }

    async fn publish(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let path = document_path(path)?;
        let mut inner = self.lock();
        if inner.unreachable {
            return Err(unreachable_error());
        }

        inner.publishes += 1;
        inner
            .documents
            .insert(path.as_str().to_string(), value.clone());
        inner.notify(path.as_str(), RemoteEvent::Snapshot(Some(value)));
        Ok(())
    }
}

fn unreachable_error() -> RemoteError {
    RemoteError::Unreachable("memory store is offline".to_string())
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
