pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use insurance_analytics_core::table::DisplayTable;
use serde_json::Value;

use crate::OutputFormat;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The display table of a pipeline result, if `value` is one.
pub fn display_table(value: &Value) -> Option<DisplayTable> {
    let table = value.get("result")?.get("table")?;
    serde_json::from_value(table.clone()).ok()
}

/// Dropdown entries of an options listing, if `value` is one.
pub fn option_items(value: &Value) -> Option<&Vec<Value>> {
    value
        .get("options")
        .or_else(|| value.get("primary_options"))
        .and_then(Value::as_array)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
