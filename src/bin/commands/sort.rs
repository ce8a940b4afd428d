use anyhow::{anyhow, Result};
use clap::Args;
use dbkit::{Databases, OutputFormat, SortOptions};
use serde::Serialize;
use serde_json::json;

use super::{print_rows, to_row};

/// Arguments for the Sort command
#[derive(Args)]
pub struct SortArgs {
    /// Table holding the rows
    #[clap(short, long)]
    pub table: String,

    /// Column identifying the rows, the primary key by default
    #[clap(short, long, default_value = "")]
    pub key_column: String,

    /// Column holding the position
    #[clap(short, long, default_value = "")]
    pub sort_column: String,

    /// Print the statement instead of running it
    #[clap(long)]
    pub dry_run: bool,

    /// New positions as KEY=POSITION, e.g. 4=1 1=4
    #[clap(required = true)]
    pub values: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SortResult {
    table: String,
    rows: usize,
}

/// Parsed positions; keys stay integers only when every key is one
#[derive(Debug, PartialEq)]
enum Positions {
    Integer(Vec<(i64, i64)>),
    Text(Vec<(String, i64)>),
}

fn parse_positions(values: &[String]) -> Result<Positions> {
    let mut pairs = Vec::with_capacity(values.len());
    for value in values {
        let (key, position) = value
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid position '{}', expected KEY=POSITION", value))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("Invalid position '{}': empty key", value));
        }
        let position: i64 = position
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid position '{}': {}", value, e))?;
        pairs.push((key.to_string(), position));
    }

    let integers: Option<Vec<(i64, i64)>> = pairs
        .iter()
        .map(|(k, v)| k.parse::<i64>().ok().map(|k| (k, *v)))
        .collect();

    Ok(match integers {
        Some(integers) => Positions::Integer(integers),
        None => Positions::Text(pairs),
    })
}

pub fn run(
    databases: &Databases,
    db: &str,
    args: SortArgs,
    output_format: OutputFormat,
) -> Result<()> {
    let SortArgs {
        table,
        key_column,
        sort_column,
        dry_run,
        values,
    } = args;

    let positions = parse_positions(&values)?;
    let database = databases.get(db)?;
    let options = SortOptions::new(&table)
        .key_column(key_column)
        .sort_column(sort_column);

    if dry_run {
        let stmt = match positions {
            Positions::Integer(v) => options.statement(&database, v)?,
            Positions::Text(v) => options.statement(&database, v)?,
        };
        let params: Vec<String> = stmt.params().iter().map(|p| format!("{:?}", p)).collect();
        let row = json!({ "sql": stmt.sql(), "params": params.join(", ") });
        print_rows(&[to_row(&row)?], output_format);
        return Ok(());
    }

    let rows = match positions {
        Positions::Integer(v) => options.exec(&database, v)?,
        Positions::Text(v) => options.exec(&database, v)?,
    };

    print_rows(&[to_row(&SortResult { table, rows })?], output_format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_integer_keys() {
        let parsed = parse_positions(&args(&["4=1", " 1 = 4 "])).unwrap();
        assert_eq!(parsed, Positions::Integer(vec![(4, 1), (1, 4)]));
    }

    #[test]
    fn test_parse_mixed_keys_as_text() {
        let parsed = parse_positions(&args(&["a=1", "2=2"])).unwrap();
        assert_eq!(
            parsed,
            Positions::Text(vec![("a".to_string(), 1), ("2".to_string(), 2)])
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_positions(&args(&["4"])).is_err());
        assert!(parse_positions(&args(&["=1"])).is_err());
        assert!(parse_positions(&args(&["a=first"])).is_err());
    }
}
