//! Terminal rendering helpers shared by the commands.

pub mod table;
pub mod tree;

pub use table::{list_table, render_list, styled_status};
pub use tree::render_item_tree;
