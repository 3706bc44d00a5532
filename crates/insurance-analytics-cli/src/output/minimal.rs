use serde_json::Value;

use super::{display_table, format_value, option_items};

/// Print just the key answer: one line per table row with its label and
/// first metric value, or the option values of a listing.
pub fn print_minimal(value: &Value) {
    if let Some(table) = display_table(value) {
        if let Some(placeholder) = table.placeholder() {
            println!("{placeholder}");
            return;
        }
        let n_id = table.identifier_columns.len();
        for cells in table.formatted_rows() {
            let label = cells[..n_id].join(" ");
            let first = cells.get(n_id).map(String::as_str).unwrap_or("-");
            println!("{label}\t{first}");
        }
        return;
    }

    if let Some(items) = option_items(value) {
        for item in items {
            println!("{}", item.get("value").map(format_value).unwrap_or_default());
        }
        return;
    }

    println!("{}", format_value(value));
}
