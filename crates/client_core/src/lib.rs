//! Client side of the shared tier-list board: local state, normalization of
//! remote snapshots, and the session that keeps both in step.

pub mod board_store;
pub mod config;
pub mod error;
pub mod normalize;
pub mod remote;
pub mod sync;

pub use board_store::{BoardPolicy, BoardStore, DragEnd, DragLocation, DuplicatePolicy, LoadStatus};
pub use config::{load_remote_config, RemoteConfig};
pub use error::{BoardError, RemoteError, SyncError};
pub use normalize::DedupPolicy;
pub use remote::{DocumentStore, MemoryDocumentStore, RelayDocumentStore, RemoteEvent, Subscription};
pub use sync::{SessionEvent, SessionOptions, TierListSession};
