use anyhow::{anyhow, Result};
use clap::Args;
use dbkit::query::{like, order_by, paging, prefix, suffix};
use dbkit::{Databases, OutputFormat, Query};
use serde_json::json;

use super::{print_rows, to_row};

/// Arguments for the Query command
#[derive(Args)]
pub struct QueryArgs {
    /// Table to read from
    #[clap(short, long)]
    pub table: String,

    /// Columns to select, comma separated; all columns by default
    #[clap(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Rows whose column contains the text, as COLUMN=TEXT
    #[clap(long)]
    pub like: Vec<String>,

    /// Rows whose column starts with the text, as COLUMN=TEXT
    #[clap(long)]
    pub prefix: Vec<String>,

    /// Rows whose column ends with the text, as COLUMN=TEXT
    #[clap(long)]
    pub suffix: Vec<String>,

    /// Page number, starting at 1
    #[clap(long, default_value_t = 1)]
    pub page: i64,

    /// Page size; 0 uses the default size, negative disables paging
    #[clap(long, default_value_t = 0)]
    pub size: i64,

    /// Order spec such as "-created_at,name"
    #[clap(long, default_value = "")]
    pub order: String,

    /// Print the number of matching rows instead of the rows
    #[clap(long)]
    pub count: bool,
}

fn split_filter(filter: &str) -> Result<(&str, &str)> {
    let (column, text) = filter
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid filter '{}', expected COLUMN=TEXT", filter))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(anyhow!("Invalid filter '{}': empty column", filter));
    }
    Ok((column, text))
}

/// Assemble the query described by the arguments
fn build_query(args: &QueryArgs) -> Result<Query> {
    let mut query = Query::table(&args.table).select(args.columns.iter().map(String::as_str));

    for filter in &args.like {
        let (column, text) = split_filter(filter)?;
        query = query.scope(like(column, text));
    }
    for filter in &args.prefix {
        let (column, text) = split_filter(filter)?;
        query = query.scope(prefix(column, text));
    }
    for filter in &args.suffix {
        let (column, text) = split_filter(filter)?;
        query = query.scope(suffix(column, text));
    }

    Ok(query)
}

pub fn run(
    databases: &Databases,
    db: &str,
    args: QueryArgs,
    output_format: OutputFormat,
) -> Result<()> {
    let database = databases.get(db)?;
    let query = build_query(&args)?;

    if args.count {
        let count = query.count(&database)?;
        print_rows(&[to_row(&json!({ "count": count }))?], output_format);
        return Ok(());
    }

    let rows = query
        .scope(order_by(&args.order, ""))
        .scope(paging(args.page, args.size, None))
        .fetch(&database)?;
    print_rows(&rows, output_format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> QueryArgs {
        QueryArgs {
            table: "users".to_string(),
            columns: vec![],
            like: vec![],
            prefix: vec![],
            suffix: vec![],
            page: 1,
            size: 0,
            order: String::new(),
            count: false,
        }
    }

    #[test]
    fn test_split_filter() {
        assert_eq!(split_filter("name=ann").unwrap(), ("name", "ann"));
        assert_eq!(split_filter("note=a=b").unwrap(), ("note", "a=b"));
        assert!(split_filter("name").is_err());
        assert!(split_filter(" =x").is_err());
    }

    #[test]
    fn test_build_query() {
        let mut args = args();
        args.like = vec!["name=an".to_string()];
        args.suffix = vec!["email=.org".to_string()];

        let sql = build_query(&args).unwrap().to_sql();
        assert_eq!(
            sql.sql(),
            "SELECT * FROM \"users\" WHERE (\"name\" LIKE ?) AND (\"email\" LIKE ?)"
        );
        assert_eq!(sql.params().len(), 2);
    }
}
