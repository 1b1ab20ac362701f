use super::*;
use serde_json::json;

fn ids(board: &Board, key: TierKey) -> Vec<&str> {
    board
        .tier(key)
        .items
        .iter()
        .map(|item| item.id.as_str())
        .collect()
}

#[test]
fn missing_document_yields_seeded_board_that_needs_publishing() {
    let normalized = normalize(None, DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(normalized.board, Board::default());
    assert_eq!(normalized.source, SchemaVersion::Missing);
    assert!(normalized.differs_from_input);

    let empty = normalize(None, DedupPolicy::ById, SeedPolicy::Empty);
    assert_eq!(empty.board.item_count(), 0);
}

#[test]
fn canonical_document_is_stable() {
    let mut board = Board::default();
    board.tier_mut(TierKey::S).name = "Best".into();
    let raw = document::to_value(&board);

    let normalized = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(normalized.board, board);
    assert!(!normalized.differs_from_input);
    assert_eq!(normalized.removed, 0);
}

#[test]
fn normalizing_twice_is_idempotent() {
    let raw = json!({
        "S": ["a", "b", "a"],
        "unranked": [{ "id": "1", "content": "one" }, { "id": "1", "content": "uno" }],
        "bogus": ["ignored"]
    });
    let first = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert!(first.differs_from_input);

    let canonical = document::to_value(&first.board);
    let second = normalize(Some(&canonical), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(second.board, first.board);
    assert!(!second.differs_from_input);
}

#[test]
fn first_occurrence_in_key_order_wins() {
    let raw = json!({
        "version": 2,
        "tiers": {
            "unranked": { "name": "unranked", "items": [{ "id": "dup", "content": "late" }] },
            "B": { "name": "B", "items": [{ "id": "dup", "content": "early" }] },
            "S": { "name": "S", "items": [{ "id": "solo", "content": "solo" }] }
        }
    });
    let normalized = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(ids(&normalized.board, TierKey::B), vec!["dup"]);
    assert!(normalized.board.tier(TierKey::Unranked).items.is_empty());
    assert_eq!(normalized.removed, 1);
}

#[test]
fn content_policy_ignores_ids_and_whitespace() {
    let raw = json!({
        "A": [
            { "id": "1", "content": "Pizza", "image": null },
            { "id": "2", "content": " Pizza ", "image": "" },
            { "id": "3", "content": "Pizza", "image": "pizza.png" }
        ]
    });
    let by_content = normalize(Some(&raw), DedupPolicy::ByContent, SeedPolicy::Placeholders);
    assert_eq!(ids(&by_content.board, TierKey::A), vec!["1", "3"]);

    let by_id = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(ids(&by_id.board, TierKey::A), vec!["1", "2", "3"]);
}

#[test]
fn dedup_off_keeps_everything() {
    let raw = json!({ "unranked": ["X", "X"] });
    let normalized = normalize(Some(&raw), DedupPolicy::Off, SeedPolicy::Placeholders);
    assert_eq!(normalized.board.tier(TierKey::Unranked).items.len(), 2);
    assert_eq!(normalized.removed, 0);
}

#[test]
fn legacy_strings_collapse_to_one_item() {
    let raw = json!({ "unranked": ["X", "X"] });
    let normalized = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(normalized.source, SchemaVersion::BareStrings);
    assert_eq!(ids(&normalized.board, TierKey::Unranked), vec!["legacy:X"]);
    assert!(normalized.differs_from_input);
}

#[test]
fn partial_document_is_backfilled() {
    let raw = json!({ "version": 2, "tiers": { "C": { "name": "Meh", "items": [] } } });
    let normalized = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(normalized.board.tiers().count(), 8);
    assert_eq!(normalized.board.tier(TierKey::C).name, "Meh");
    assert_eq!(normalized.board.tier(TierKey::F).name, "F");
    assert!(normalized.differs_from_input);
}

#[test]
fn unreadable_document_counts_drops() {
    let raw = json!({ "S": 42, "A": [true, "ok"] });
    let normalized = normalize(Some(&raw), DedupPolicy::ById, SeedPolicy::Placeholders);
    assert_eq!(normalized.dropped, 2);
    assert_eq!(ids(&normalized.board, TierKey::A), vec!["legacy:ok"]);
}
