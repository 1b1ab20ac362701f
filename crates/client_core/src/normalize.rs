//! Turns whatever is stored remotely into a board the store can hold.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    document::{self, SchemaVersion},
    domain::{Board, Item, ItemId, SeedPolicy, TierKey},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    Off,
    /// Same item id anywhere on the board.
    #[default]
    ById,
    /// Same trimmed content and image, regardless of id.
    ByContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub board: Board,
    pub source: SchemaVersion,
    /// Duplicate items dropped by the dedup pass.
    pub removed: usize,
    /// Parts of the raw document that could not be read at all.
    pub dropped: usize,
    /// The canonical form of `board` is not what was stored, so it should be
    /// written back.
    pub differs_from_input: bool,
}

pub fn normalize(raw: Option<&Value>, dedup_policy: DedupPolicy, seed: SeedPolicy) -> Normalized {
    let migrated = document::migrate(raw);

    if migrated.source == SchemaVersion::Missing {
        debug!("remote document is empty; using default board");
        return Normalized {
            board: Board::seeded(seed),
            source: SchemaVersion::Missing,
            removed: 0,
            dropped: 0,
            differs_from_input: true,
        };
    }

    let mut board = migrated.board;
    let removed = dedup(&mut board, dedup_policy);
    if removed > 0 {
        warn!(removed, policy = ?dedup_policy, "dropped duplicate items from remote board");
    }
    if migrated.dropped > 0 {
        warn!(
            dropped = migrated.dropped,
            source = ?migrated.source,
            "ignored unreadable parts of remote board"
        );
    }

    let differs_from_input = raw.is_some_and(|raw| document::to_value(&board) != *raw);
    Normalized {
        board,
        source: migrated.source,
        removed,
        dropped: migrated.dropped,
        differs_from_input,
    }
}

/// Removes repeated items in place, scanning tiers in [`TierKey::ALL`] order
/// so the first occurrence survives. Returns how many were removed.
pub fn dedup(board: &mut Board, policy: DedupPolicy) -> usize {
    match policy {
        DedupPolicy::Off => 0,
        DedupPolicy::ById => {
            let mut seen: HashSet<ItemId> = HashSet::new();
            retain_first(board, |item| seen.insert(item.id.clone()))
        }
        DedupPolicy::ByContent => {
            let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
            retain_first(board, |item| {
                let image = item.display_image().map(str::to_string);
                seen.insert((item.content.trim().to_string(), image))
            })
        }
    }
}

fn retain_first(board: &mut Board, mut keep: impl FnMut(&Item) -> bool) -> usize {
    let mut removed = 0;
    for key in TierKey::ALL {
        let items = &mut board.tier_mut(key).items;
        let before = items.len();
        items.retain(|item| keep(item));
        removed += before - items.len();
    }
    removed
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
