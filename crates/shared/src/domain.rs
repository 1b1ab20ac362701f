use std::{fmt, str::FromStr};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const ITEM_ID_SUFFIX_LEN: usize = 9;
const LEGACY_ID_PREFIX: &str = "legacy:";
const SEED_ITEM_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Millisecond timestamp followed by a random alphanumeric suffix.
    /// Collisions are not checked.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}",
            Utc::now().timestamp_millis(),
            &suffix[..ITEM_ID_SUFFIX_LEN]
        ))
    }

    /// Identity for items that were stored as bare strings, where the content
    /// itself was the only key.
    pub fn legacy(content: &str) -> Self {
        Self(format!("{LEGACY_ID_PREFIX}{content}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierKey {
    S,
    A,
    B,
    C,
    D,
    E,
    F,
    #[serde(rename = "unranked")]
    Unranked,
}

impl TierKey {
    /// Fixed scan order. Deduplication keeps the first occurrence in this order.
    pub const ALL: [TierKey; 8] = [
        TierKey::S,
        TierKey::A,
        TierKey::B,
        TierKey::C,
        TierKey::D,
        TierKey::E,
        TierKey::F,
        TierKey::Unranked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TierKey::S => "S",
            TierKey::A => "A",
            TierKey::B => "B",
            TierKey::C => "C",
            TierKey::D => "D",
            TierKey::E => "E",
            TierKey::F => "F",
            TierKey::Unranked => "unranked",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn default_label(self) -> String {
        self.as_str().to_string()
    }
}

impl fmt::Display for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tier '{0}'")]
pub struct UnknownTierKey(pub String);

impl FromStr for TierKey {
    type Err = UnknownTierKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unranked") {
            return Ok(TierKey::Unranked);
        }
        TierKey::ALL
            .into_iter()
            .find(|key| key.as_str() == trimmed.to_ascii_uppercase())
            .ok_or_else(|| UnknownTierKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub content: String,
    pub image: Option<String>,
}

impl Item {
    pub fn new(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            id: ItemId::generate(),
            content: content.into(),
            image,
        }
    }

    /// Same trimmed content and image, ignoring identity. A blank image
    /// counts as none.
    pub fn same_content(&self, content: &str, image: Option<&str>) -> bool {
        let image = image.map(str::trim).filter(|image| !image.is_empty());
        self.content.trim() == content.trim() && self.display_image() == image
    }

    pub fn display_image(&self) -> Option<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub items: Vec<Item>,
}

impl Tier {
    pub fn empty(key: TierKey) -> Self {
        Self {
            name: key.default_label(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    Empty,
    #[default]
    Placeholders,
}

/// All eight tiers, always present and indexed by [`TierKey`]. The wire
/// form lives in [`crate::document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    tiers: [Tier; 8],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            tiers: TierKey::ALL.map(Tier::empty),
        }
    }

    pub fn seeded(seed: SeedPolicy) -> Self {
        let mut board = Self::empty();
        if seed == SeedPolicy::Placeholders {
            board.tier_mut(TierKey::Unranked).items = (1..=SEED_ITEM_COUNT)
                .map(|n| Item {
                    id: ItemId(format!("seed-{n}")),
                    content: format!("Item {n}"),
                    image: None,
                })
                .collect();
        }
        board
    }

    pub fn tier(&self, key: TierKey) -> &Tier {
        &self.tiers[key.index()]
    }

    pub fn tier_mut(&mut self, key: TierKey) -> &mut Tier {
        &mut self.tiers[key.index()]
    }

    pub fn tiers(&self) -> impl Iterator<Item = (TierKey, &Tier)> {
        TierKey::ALL.into_iter().zip(self.tiers.iter())
    }

    pub fn item_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.items.len()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = (TierKey, &Item)> {
        self.tiers()
            .flat_map(|(key, tier)| tier.items.iter().map(move |item| (key, item)))
    }

    pub fn find_item(&self, id: &ItemId) -> Option<(TierKey, usize)> {
        self.tiers().find_map(|(key, tier)| {
            tier.items
                .iter()
                .position(|item| &item.id == id)
                .map(|index| (key, index))
        })
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::seeded(SeedPolicy::default())
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
