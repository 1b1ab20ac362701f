//! Wire form of a board and the one-way migration from every shape the
//! document has had.
//!
//! The canonical document is versioned and tagged:
//!
//! ```json
//! { "version": 2, "tiers": { "S": { "name": "S", "items": [] }, "unranked": { ... } } }
//! ```
//!
//! Older writers stored the tiers at the top level, either as bare arrays of
//! strings, bare arrays of items, or `{ name, items }` objects. Migration reads
//! any of them and never fails: unknown or malformed parts fall back to the
//! empty default for that tier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Board, Item, ItemId, Tier, TierKey};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// No document stored yet.
    Missing,
    /// Tiers at the top level as arrays of plain strings.
    BareStrings,
    /// Tiers at the top level as arrays of items or named tier objects.
    Unversioned,
    Versioned(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub version: u32,
    pub tiers: BTreeMap<TierKey, Tier>,
}

impl From<&Board> for BoardDocument {
    fn from(board: &Board) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            tiers: board
                .tiers()
                .map(|(key, tier)| (key, tier.clone()))
                .collect(),
        }
    }
}

/// Canonical JSON for a board. This is what gets published.
pub fn to_value(board: &Board) -> Value {
    // BoardDocument only holds strings and maps keyed by unit variants.
    serde_json::to_value(BoardDocument::from(board)).unwrap_or(Value::Null)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedSnapshot {
    pub board: Board,
    pub source: SchemaVersion,
    /// Parts of the input that could not be interpreted and were dropped.
    pub dropped: usize,
}

/// Reads any historical document shape into a full board, backfilling missing
/// tiers from [`Board::empty`]. Duplicates are left in place.
pub fn migrate(raw: Option<&Value>) -> MigratedSnapshot {
    let mut board = Board::empty();
    let mut dropped = 0;

    let Some(raw) = raw.filter(|value| !value.is_null()) else {
        return MigratedSnapshot {
            board,
            source: SchemaVersion::Missing,
            dropped,
        };
    };

    let Some(object) = raw.as_object() else {
        return MigratedSnapshot {
            board,
            source: SchemaVersion::Unversioned,
            dropped: 1,
        };
    };

    let (tiers, source) = match (object.get("version"), object.get("tiers")) {
        (Some(version), Some(Value::Object(tiers))) => {
            let version = version
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(CURRENT_SCHEMA_VERSION);
            (tiers, SchemaVersion::Versioned(version))
        }
        _ => {
            let bare_strings = object.values().any(|tier| {
                tier.as_array()
                    .is_some_and(|items| items.iter().any(Value::is_string))
            });
            let source = if bare_strings {
                SchemaVersion::BareStrings
            } else {
                SchemaVersion::Unversioned
            };
            (object, source)
        }
    };

    for (raw_key, raw_tier) in tiers {
        let Ok(key) = raw_key.parse::<TierKey>() else {
            if raw_key != "version" {
                dropped += 1;
            }
            continue;
        };
        match read_tier(key, raw_tier) {
            Some((tier, skipped)) => {
                *board.tier_mut(key) = tier;
                dropped += skipped;
            }
            None => dropped += 1,
        }
    }

    MigratedSnapshot {
        board,
        source,
        dropped,
    }
}

fn read_tier(key: TierKey, raw: &Value) -> Option<(Tier, usize)> {
    match raw {
        Value::Array(items) => {
            let (items, skipped) = read_items(items);
            Some((
                Tier {
                    name: key.default_label(),
                    items,
                },
                skipped,
            ))
        }
        Value::Object(object) => {
            let name = object
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| key.default_label());
            let (items, skipped) = match object.get("items") {
                Some(Value::Array(items)) => read_items(items),
                Some(Value::Null) | None => (Vec::new(), 0),
                Some(_) => (Vec::new(), 1),
            };
            Some((Tier { name, items }, skipped))
        }
        _ => None,
    }
}

fn read_items(raw: &[Value]) -> (Vec<Item>, usize) {
    let mut skipped = 0;
    let items = raw
        .iter()
        .filter_map(|value| {
            let item = read_item(value);
            if item.is_none() {
                skipped += 1;
            }
            item
        })
        .collect();
    (items, skipped)
}

fn read_item(raw: &Value) -> Option<Item> {
    match raw {
        Value::String(content) => Some(Item {
            id: ItemId::legacy(content),
            content: content.clone(),
            image: None,
        }),
        Value::Object(object) => {
            let content = object
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let image = object
                .get("image")
                .and_then(Value::as_str)
                .filter(|image| !image.trim().is_empty())
                .map(str::to_string);
            let id = match object.get("id") {
                Some(Value::String(id)) if !id.is_empty() => ItemId(id.clone()),
                Some(Value::Number(id)) => ItemId(id.to_string()),
                _ => ItemId::legacy(&content),
            };
            Some(Item { id, content, image })
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/document_tests.rs"]
mod tests;
