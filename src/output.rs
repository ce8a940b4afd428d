//! Output formatting for query results
//!
//! Rows come back from [`crate::Database::query_rows`] as JSON objects; this
//! module renders them in the formats the CLI offers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::database::JsonRow;

/// How the CLI prints rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Markdown,
    Json,
    JsonPretty,
    /// One object per line
    JsonLine,
    /// `|` separated, header first
    Psv,
}

/// Canonical name first, then accepted aliases
const NAMES: &[(OutputFormat, &[&str])] = &[
    (OutputFormat::Table, &["table", "pretty"]),
    (OutputFormat::Markdown, &["markdown", "md"]),
    (OutputFormat::Json, &["json"]),
    (OutputFormat::JsonPretty, &["json-pretty", "jsonpretty"]),
    (OutputFormat::JsonLine, &["json-line", "jsonline", "jsonl", "ndjson"]),
    (OutputFormat::Psv, &["psv", "pipe"]),
];

impl OutputFormat {
    /// Whether rows are printed as JSON (an empty result is then `[]`, not a notice)
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty | Self::JsonLine)
    }

    pub fn name(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(format, _)| format == self)
            .and_then(|(_, names)| names.first())
            .copied()
            .unwrap_or("table")
    }

    /// Canonical names of every format
    pub fn names() -> Vec<&'static str> {
        NAMES
            .iter()
            .filter_map(|(_, names)| names.first().copied())
            .collect()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(_, names)| names.iter().any(|name| *name == wanted))
            .map(|(format, _)| *format)
            .ok_or_else(|| {
                format!(
                    "unknown format '{}', expected one of: {}",
                    s,
                    Self::names().join(", ")
                )
            })
    }
}

/// Column names in first-seen order across all rows
fn headers(rows: &[JsonRow]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render rows in the requested format
pub fn format_rows(rows: &[JsonRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => JsonValue::from(rows.to_vec()).to_string(),
        OutputFormat::JsonPretty => serde_json::to_string_pretty(rows).unwrap_or_default(),
        OutputFormat::JsonLine => rows
            .iter()
            .map(|row| JsonValue::Object(row.clone()).to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Psv => {
            let headers = headers(rows);
            let mut lines = vec![headers.join("|")];
            for row in rows {
                let cells: Vec<String> = headers.iter().map(|h| cell(row.get(h))).collect();
                lines.push(cells.join("|"));
            }
            lines.join("\n")
        }
        OutputFormat::Table | OutputFormat::Markdown => {
            let headers = headers(rows);
            let mut builder = Builder::default();
            builder.push_record(headers.clone());
            for row in rows {
                builder.push_record(headers.iter().map(|h| cell(row.get(h))));
            }
            let mut table = builder.build();
            if format == OutputFormat::Markdown {
                table.with(Style::markdown());
            } else {
                table.with(Style::rounded());
            }
            table.to_string()
        }
    }
}
