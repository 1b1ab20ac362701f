//! Keeps one board in step with one remote document.
//!
//! Remote snapshots are normalized into the [`BoardStore`]; every local
//! mutation drops the full new snapshot into a single pending-write slot that
//! one writer task drains. A queued snapshot that has not started publishing
//! yet is replaced by the next one.
//!
//! The subscription also delivers echoes of this session's own publishes.
//! An echo of a snapshot that a newer local edit has already replaced is
//! dropped, so it cannot roll the board back while the newer write is queued.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use serde_json::Value;
use shared::{
    document,
    domain::{Board, Item, ItemId, TierKey},
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    board_store::{BoardPolicy, BoardStore, DragEnd, LoadStatus},
    config::DEFAULT_DOCUMENT_PATH,
    error::{BoardError, RemoteError, SyncError},
    remote::{DocumentStore, RemoteEvent},
};

const EVENT_CAPACITY: usize = 64;
const MAX_SENT_WRITES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub path: String,
    pub policy: BoardPolicy,
    /// Only used to label log spans.
    pub project_id: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_DOCUMENT_PATH.to_string(),
            policy: BoardPolicy::default(),
            project_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    BoardChanged(Board),
    /// Something the user should see that is not a failure, e.g. a rejected
    /// duplicate.
    Notice(String),
    Error(String),
}

#[derive(Debug, Clone)]
struct PendingWrite {
    generation: u64,
    value: Value,
}

#[derive(Debug, Clone, Default)]
struct WriteAttempt {
    generation: u64,
    error: Option<RemoteError>,
}

/// Snapshots this session has committed and handed to the remote store.
#[derive(Debug, Default)]
struct OwnWrites {
    latest: Option<Value>,
    sent: VecDeque<(u64, Value)>,
}

impl OwnWrites {
    fn committed(&mut self, value: &Value) {
        self.latest = Some(value.clone());
    }

    fn sending(&mut self, generation: u64, value: &Value) {
        if self.sent.len() == MAX_SENT_WRITES {
            self.sent.pop_front();
        }
        self.sent.push_back((generation, value.clone()));
    }

    fn failed(&mut self, generation: u64) {
        self.sent.retain(|(sent, _)| *sent != generation);
    }

    /// True when `raw` echoes one of our publishes that a newer local
    /// snapshot supersedes. Echoes up to and including it are forgotten.
    fn is_superseded_echo(&mut self, raw: Option<&Value>) -> bool {
        let Some(raw) = raw else {
            return false;
        };
        if self.latest.as_ref() == Some(raw) {
            self.sent.clear();
            return false;
        }
        match self.sent.iter().position(|(_, value)| value == raw) {
            Some(index) => {
                self.sent.drain(..=index);
                true
            }
            None => false,
        }
    }
}

struct SessionShared {
    store: Mutex<BoardStore>,
    remote: Arc<dyn DocumentStore>,
    path: String,
    events: broadcast::Sender<SessionEvent>,
    status: watch::Sender<LoadStatus>,
    outbox: watch::Sender<Option<PendingWrite>>,
    generation: AtomicU64,
    own_writes: StdMutex<OwnWrites>,
}

impl SessionShared {
    /// Must be called with the store lock held so queue order matches
    /// mutation order.
    fn commit(&self, store: &BoardStore, board: &Board) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let value = document::to_value(board);
        self.own_writes().committed(&value);
        self.outbox
            .send_replace(Some(PendingWrite { generation, value }));
        self.status.send_replace(store.status());
        let _ = self.events.send(SessionEvent::BoardChanged(board.clone()));
    }

    fn own_writes(&self) -> std::sync::MutexGuard<'_, OwnWrites> {
        self.own_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn apply_snapshot(&self, raw: Option<&Value>) {
        let mut store = self.store.lock().await;
        if self.own_writes().is_superseded_echo(raw) {
            debug!(path = %self.path, "skipping echo of a superseded local write");
            return;
        }
        let outcome = store.load_from_remote(raw);
        if outcome.needs_publish {
            info!(
                path = %self.path,
                removed = outcome.removed,
                "remote board is not canonical; writing it back"
            );
            self.commit(&store, &outcome.board);
        } else {
            self.status.send_replace(store.status());
            let _ = self.events.send(SessionEvent::BoardChanged(outcome.board));
        }
    }

    async fn fail(&self, err: &RemoteError) {
        warn!(path = %self.path, %err, "remote store failed");
        let mut store = self.store.lock().await;
        store.set_error(err.to_string());
        self.status.send_replace(store.status());
        let _ = self.events.send(SessionEvent::Error(err.to_string()));
    }
}

/// A live board bound to one remote document.
pub struct TierListSession {
    shared: Arc<SessionShared>,
    completed: watch::Receiver<WriteAttempt>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TierListSession {
    /// Subscribes to `options.path` on `remote` and starts the writer. Must be
    /// called inside a Tokio runtime.
    pub fn start(remote: Arc<dyn DocumentStore>, options: SessionOptions) -> Self {
        let span = info_span!(
            "tierlist_session",
            path = %options.path,
            project_id = options.project_id.as_deref().unwrap_or("-")
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(LoadStatus::Loading);
        let (outbox, outbox_rx) = watch::channel(None);
        let (completed_tx, completed) = watch::channel(WriteAttempt::default());

        let shared = Arc::new(SessionShared {
            store: Mutex::new(BoardStore::new(options.policy)),
            remote,
            path: options.path,
            events,
            status,
            outbox,
            generation: AtomicU64::new(0),
            own_writes: StdMutex::new(OwnWrites::default()),
        });

        let subscriber = tokio::spawn(
            run_subscription(Arc::clone(&shared)).instrument(span.clone()),
        );
        let writer = tokio::spawn(
            run_writer(Arc::clone(&shared), outbox_rx, completed_tx).instrument(span),
        );

        Self {
            shared,
            completed,
            tasks: StdMutex::new(vec![subscriber, writer]),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub async fn board(&self) -> Option<Board> {
        self.shared.store.lock().await.board().cloned()
    }

    pub fn status(&self) -> LoadStatus {
        *self.shared.status.borrow()
    }

    pub async fn error(&self) -> Option<String> {
        self.shared.store.lock().await.error().map(str::to_string)
    }

    /// Waits for the first snapshot or failure.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> Result<Board, SyncError> {
        let mut status = self.shared.status.subscribe();
        tokio::time::timeout(
            timeout,
            status.wait_for(|status| *status != LoadStatus::Loading),
        )
        .await
        .map_err(|_| SyncError::LoadTimeout(timeout))?
        .map_err(|_| SyncError::Closed)?;

        let store = self.shared.store.lock().await;
        match store.board() {
            Some(board) => Ok(board.clone()),
            None => Err(SyncError::Unavailable(
                store.error().unwrap_or("no snapshot").to_string(),
            )),
        }
    }

    /// Drops with no destination are ignored and publish nothing.
    pub async fn handle_drag_end(&self, drag: DragEnd) -> Result<Option<Board>, SyncError> {
        self.ensure_open()?;
        let mut store = self.shared.store.lock().await;
        let Some(board) = store.apply_drag_end(drag)? else {
            debug!(source = ?drag.source, "drop outside any tier");
            return Ok(None);
        };
        self.shared.commit(&store, &board);
        Ok(Some(board))
    }

    pub async fn add_item(&self, text: &str, image_url: Option<&str>) -> Result<ItemId, SyncError> {
        self.ensure_open()?;
        let mut store = self.shared.store.lock().await;
        match store.add_item(text, image_url) {
            Ok((board, id)) => {
                self.shared.commit(&store, &board);
                Ok(id)
            }
            Err(err @ BoardError::DuplicateItem { .. }) => {
                if let Some(notice) = store.notice() {
                    let _ = self
                        .shared
                        .events
                        .send(SessionEvent::Notice(notice.to_string()));
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn remove_item(&self, id: &ItemId) -> Result<Item, SyncError> {
        self.ensure_open()?;
        let mut store = self.shared.store.lock().await;
        let (board, removed) = store.remove_item(id)?;
        self.shared.commit(&store, &board);
        Ok(removed)
    }

    pub async fn rename_tier(&self, key: TierKey, new_name: &str) -> Result<Board, SyncError> {
        self.ensure_open()?;
        let mut store = self.shared.store.lock().await;
        let board = store.rename_tier(key, new_name)?;
        self.shared.commit(&store, &board);
        Ok(board)
    }

    /// Overwrites the remote document with the default board.
    pub async fn reset(&self) -> Result<Board, SyncError> {
        self.ensure_open()?;
        let mut store = self.shared.store.lock().await;
        let board = store.reset();
        info!(path = %self.shared.path, "board reset");
        self.shared.commit(&store, &board);
        Ok(board)
    }

    /// Waits until the latest queued snapshot has been attempted and reports
    /// that attempt's failure, if any.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.ensure_open()?;
        let target = self.shared.generation.load(Ordering::SeqCst);
        let mut completed = self.completed.clone();
        let attempt = completed
            .wait_for(|attempt| attempt.generation >= target)
            .await
            .map_err(|_| SyncError::Closed)?
            .clone();
        match attempt.error {
            Some(err) => Err(SyncError::Remote(err)),
            None => Ok(()),
        }
    }

    /// Stops the subscription and the writer. Idempotent; anything still
    /// queued is not written.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
        debug!(path = %self.shared.path, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        Ok(())
    }
}

impl Drop for TierListSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_subscription(shared: Arc<SessionShared>) {
    let mut subscription = match shared.remote.subscribe(&shared.path).await {
        Ok(subscription) => subscription,
        Err(err) => {
            shared.fail(&err).await;
            return;
        }
    };

    while let Some(event) = subscription.next().await {
        match event {
            RemoteEvent::Snapshot(raw) => shared.apply_snapshot(raw.as_ref()).await,
            RemoteEvent::Failed(err) => shared.fail(&err).await,
        }
    }
    debug!(path = %shared.path, "subscription ended");
}

async fn run_writer(
    shared: Arc<SessionShared>,
    mut outbox: watch::Receiver<Option<PendingWrite>>,
    completed: watch::Sender<WriteAttempt>,
) {
    while outbox.changed().await.is_ok() {
        let Some(pending) = outbox.borrow_and_update().clone() else {
            continue;
        };
        // Recorded before publishing: the echo can arrive before publish returns.
        shared
            .own_writes()
            .sending(pending.generation, &pending.value);
        let error = match shared.remote.publish(&shared.path, pending.value).await {
            Ok(()) => {
                debug!(generation = pending.generation, "snapshot published");
                None
            }
            Err(err) => {
                shared.own_writes().failed(pending.generation);
                shared.fail(&err).await;
                Some(err)
            }
        };
        completed.send_replace(WriteAttempt {
            generation: pending.generation,
            error,
        });
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
