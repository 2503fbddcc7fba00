//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;

use crate::domain::models::ItemStatus;

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)));
    table
}

/// Render the table to string with a count header.
pub fn render_list(singular: &str, plural: &str, table: Table, total: usize) -> String {
    if total == 0 {
        return format!("No {} found.", plural);
    }
    let count_line = format!("{} {}:", style(total).bold(), if total == 1 { singular } else { plural });
    format!("{}\n{}", count_line, table)
}

/// Status name colored by outcome. Styling is dropped when stdout is not a terminal.
pub fn styled_status(status: ItemStatus) -> String {
    let text = style(status.as_str());
    match status {
        ItemStatus::Passed => text.green(),
        ItemStatus::Failed | ItemStatus::Interrupted => text.red(),
        ItemStatus::Skipped => text.yellow(),
        ItemStatus::InProgress => text.cyan(),
    }
    .to_string()
}
