//! Local board state and the pure transitions that produce each new snapshot.
//!
//! The free functions never touch their input board; [`BoardStore`] wraps them
//! with load status and the user-facing error and notice strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{Board, Item, ItemId, SeedPolicy, TierKey};
use tracing::{debug, info};

use crate::{
    error::BoardError,
    normalize::{normalize, DedupPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragLocation {
    pub tier: TierKey,
    pub index: usize,
}

impl DragLocation {
    pub fn new(tier: TierKey, index: usize) -> Self {
        Self { tier, index }
    }
}

/// End of a drag gesture. A drop outside any tier has no destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragEnd {
    pub source: DragLocation,
    pub destination: Option<DragLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    Allow,
    #[default]
    RejectSameContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardPolicy {
    pub dedup: DedupPolicy,
    pub duplicates: DuplicatePolicy,
    pub seed: SeedPolicy,
}

/// Moves one item. `destination.index` is interpreted against the destination
/// tier after the item has been taken out.
pub fn reorder(
    board: &Board,
    source: DragLocation,
    destination: DragLocation,
) -> Result<Board, BoardError> {
    let source_len = board.tier(source.tier).items.len();
    if source.index >= source_len {
        return Err(BoardError::SourceOutOfRange {
            tier: source.tier,
            index: source.index,
            len: source_len,
        });
    }

    let destination_len = if source.tier == destination.tier {
        source_len - 1
    } else {
        board.tier(destination.tier).items.len()
    };
    if destination.index > destination_len {
        return Err(BoardError::DestinationOutOfRange {
            tier: destination.tier,
            index: destination.index,
            len: destination_len,
        });
    }

    let mut next = board.clone();
    let item = next.tier_mut(source.tier).items.remove(source.index);
    next.tier_mut(destination.tier)
        .items
        .insert(destination.index, item);
    Ok(next)
}

/// Appends a new item to the unranked pool and returns its id.
pub fn add_item(
    board: &Board,
    text: &str,
    image_url: Option<&str>,
    duplicates: DuplicatePolicy,
) -> Result<(Board, ItemId), BoardError> {
    let content = text.trim();
    let image = image_url.map(str::trim).filter(|image| !image.is_empty());
    if content.is_empty() && image.is_none() {
        return Err(BoardError::EmptyItem);
    }

    if duplicates == DuplicatePolicy::RejectSameContent {
        let existing = board
            .items()
            .find(|(_, item)| item.same_content(content, image));
        if let Some((tier, item)) = existing {
            return Err(BoardError::DuplicateItem {
                tier,
                existing: item.id.clone(),
            });
        }
    }

    let item = Item::new(content, image.map(str::to_string));
    let id = item.id.clone();
    let mut next = board.clone();
    next.tier_mut(TierKey::Unranked).items.push(item);
    Ok((next, id))
}

pub fn remove_item(board: &Board, id: &ItemId) -> Result<(Board, Item), BoardError> {
    let (tier, index) = board
        .find_item(id)
        .ok_or_else(|| BoardError::ItemNotFound(id.clone()))?;
    let mut next = board.clone();
    let item = next.tier_mut(tier).items.remove(index);
    Ok((next, item))
}

/// Blank names fall back to the tier's key.
pub fn rename_tier(board: &Board, key: TierKey, new_name: &str) -> Board {
    let name = new_name.trim();
    let mut next = board.clone();
    next.tier_mut(key).name = if name.is_empty() {
        key.default_label()
    } else {
        name.to_string()
    };
    next
}

pub fn reset(seed: SeedPolicy) -> Board {
    Board::seeded(seed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing heard from the remote yet.
    Loading,
    Ready,
    /// The remote failed before any snapshot arrived.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub board: Board,
    /// The remote copy is not canonical and should be overwritten.
    pub needs_publish: bool,
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct BoardStore {
    board: Option<Board>,
    settled: bool,
    error: Option<String>,
    notice: Option<String>,
    policy: BoardPolicy,
}

impl BoardStore {
    pub fn new(policy: BoardPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> BoardPolicy {
        self.policy
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn status(&self) -> LoadStatus {
        match (&self.board, self.settled) {
            (Some(_), _) => LoadStatus::Ready,
            (None, false) => LoadStatus::Loading,
            (None, true) => LoadStatus::Unavailable,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Replaces local state with a remote snapshot. Never fails; anything
    /// unreadable is dropped and backfilled.
    pub fn load_from_remote(&mut self, raw: Option<&Value>) -> LoadOutcome {
        let normalized = normalize(raw, self.policy.dedup, self.policy.seed);
        debug!(
            source = ?normalized.source,
            items = normalized.board.item_count(),
            needs_publish = normalized.differs_from_input,
            "loaded remote board"
        );
        self.board = Some(normalized.board.clone());
        self.settled = true;
        self.error = None;
        LoadOutcome {
            board: normalized.board,
            needs_publish: normalized.differs_from_input,
            removed: normalized.removed,
        }
    }

    /// Keeps the last known board; the message is for display only.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.settled = true;
        self.error = Some(message.into());
    }

    /// `Ok(None)` when the drop had no destination and nothing changed.
    pub fn apply_drag_end(&mut self, drag: DragEnd) -> Result<Option<Board>, BoardError> {
        let Some(destination) = drag.destination else {
            return Ok(None);
        };
        let next = reorder(self.loaded()?, drag.source, destination)?;
        Ok(Some(self.commit(next)))
    }

    pub fn add_item(
        &mut self,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<(Board, ItemId), BoardError> {
        match add_item(self.loaded()?, text, image_url, self.policy.duplicates) {
            Ok((next, id)) => Ok((self.commit(next), id)),
            Err(err @ BoardError::DuplicateItem { .. }) => {
                info!(%err, "rejected duplicate item");
                self.notice = Some("That item is already on the board.".to_string());
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn remove_item(&mut self, id: &ItemId) -> Result<(Board, Item), BoardError> {
        let (next, removed) = remove_item(self.loaded()?, id)?;
        Ok((self.commit(next), removed))
    }

    pub fn rename_tier(&mut self, key: TierKey, new_name: &str) -> Result<Board, BoardError> {
        let next = rename_tier(self.loaded()?, key, new_name);
        Ok(self.commit(next))
    }

    /// Works before the first load too; the result is written over whatever
    /// the remote holds.
    pub fn reset(&mut self) -> Board {
        self.commit(reset(self.policy.seed))
    }

    fn loaded(&self) -> Result<&Board, BoardError> {
        self.board.as_ref().ok_or(BoardError::NotLoaded)
    }

    fn commit(&mut self, next: Board) -> Board {
        self.board = Some(next.clone());
        self.settled = true;
        self.notice = None;
        next
    }
}

#[cfg(test)]
#[path = "tests/board_store_tests.rs"]
mod tests;
