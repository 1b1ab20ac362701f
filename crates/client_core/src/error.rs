use shared::domain::{ItemId, TierKey};
use thiserror::Error;

/// Rejected local mutations. The board is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board has not been loaded yet")]
    NotLoaded,
    #[error("an item needs text or an image")]
    EmptyItem,
    #[error("an item with the same content already exists in tier {tier}")]
    DuplicateItem { tier: TierKey, existing: ItemId },
    #[error("no item at index {index} in tier {tier} (it holds {len})")]
    SourceOutOfRange {
        tier: TierKey,
        index: usize,
        len: usize,
    },
    #[error("cannot insert at index {index} in tier {tier} (it holds {len})")]
    DestinationOutOfRange {
        tier: TierKey,
        index: usize,
        len: usize,
    },
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unreachable(String),
    #[error("remote store rejected the request: {0}")]
    Rejected(String),
    #[error("remote subscription closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("session is closed")]
    Closed,
    #[error("remote board unavailable: {0}")]
    Unavailable(String),
    #[error("no snapshot arrived within {0:?}")]
    LoadTimeout(std::time::Duration),
}
