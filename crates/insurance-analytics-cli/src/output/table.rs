use insurance_analytics_core::table::DisplayTable;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::Table;

use super::{display_table, format_value, option_items};

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    if let Some(table) = display_table(value) {
        print_display_table(&table);
        print_warnings(value);
    } else if let Some(items) = option_items(value) {
        print_array_table(items);
    } else {
        print_flat_object(value);
    }
}

fn print_display_table(table: &DisplayTable) {
    println!("{}", table.title);
    println!("{}\n", table.subtitle);
    if let Some(placeholder) = table.placeholder() {
        println!("{placeholder}");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(table.visible_header("\n"));
    let mut section: Option<&str> = None;
    for (row, cells) in table.rows.iter().zip(table.formatted_rows()) {
        // Section label row whenever the group changes.
        if section != Some(row.group.as_str()) {
            section = Some(row.group.as_str());
            let mut label = vec![String::new(); cells.len()];
            if let Some(first) = label.first_mut() {
                first.clone_from(&row.group_label);
            }
            builder.push_record(label);
        }
        builder.push_record(cells);
    }
    println!("{}", Table::from(builder));
}

fn print_warnings(envelope: &Value) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    } else {
        println!("{}", value);
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}
