pub mod drivers;
pub mod options;
pub mod query;
pub mod sort;

use anyhow::{anyhow, Result};
use dbkit::{format_rows, JsonRow, OutputFormat};
use serde::Serialize;

/// Serialize a record into a single output row
pub(crate) fn to_row<T: Serialize>(record: &T) -> Result<JsonRow> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(anyhow!("Expected a JSON object, got {}", other)),
    }
}

pub(crate) fn print_rows(rows: &[JsonRow], format: OutputFormat) {
    if rows.is_empty() && !format.is_json() {
        println!("No rows");
        return;
    }
    println!("{}", format_rows(rows, format));
}
