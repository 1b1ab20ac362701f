use std::fmt::Write as _;

use shared::domain::{Board, Item};

/// One line per tier, items in board order with their ids so they can be
/// passed back to `remove --id`.
pub fn render_board(board: &Board) -> String {
    let width = board
        .tiers()
        .map(|(key, tier)| heading(key.as_str(), &tier.name).chars().count())
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    for (key, tier) in board.tiers() {
        let items: Vec<String> = tier.items.iter().map(render_item).collect();
        let line = format!(
            "{:<width$} | {}",
            heading(key.as_str(), &tier.name),
            items.join(", ")
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

fn heading(key: &str, name: &str) -> String {
    if key == name {
        key.to_string()
    } else {
        format!("{key} ({name})")
    }
}

fn render_item(item: &Item) -> String {
    match &item.image {
        Some(image) if item.content.is_empty() => format!("<{image}> [{}]", item.id),
        Some(image) => format!("{} <{image}> [{}]", item.content, item.id),
        None => format!("{} [{}]", item.content, item.id),
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
