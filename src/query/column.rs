//! Column references and parameterised SQL fragments

use std::fmt;

use rusqlite::types::Value;

use crate::database::core::quote_identifier;

/// A column reference parsed from text such as `id`, `users.id`,
/// `"users"."id"` or `` `u`.`name` AS n ``
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Column {
    pub table: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl Column {
    /// Plain column without table or alias
    pub fn named(name: impl Into<String>) -> Self {
        Column {
            table: None,
            name: name.into(),
            alias: None,
        }
    }

    /// Parse a column reference, stripping identifier quotes
    pub fn parse(text: &str) -> Self {
        let (reference, alias) = match text.to_ascii_lowercase().find(" as ") {
            Some(i) if i > 0 => (&text[..i], Some(&text[i + 4..])),
            _ => (text, None),
        };

        let (table, name) = match reference.split_once('.') {
            Some((table, name)) => (Some(table), name),
            None => (None, reference),
        };

        Column {
            table: table.map(clean_name).filter(|t| !t.is_empty()),
            name: clean_name(name),
            alias: alias.map(clean_name).filter(|a| !a.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Quoted reference usable inside expressions, e.g. `"users"."id"`
    pub fn to_sql(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", quote_identifier(table), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }

    /// Quoted bare column name, as required on the left of `SET`
    pub fn name_sql(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Reference with its alias, for select lists
    pub fn to_select_sql(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {}", self.to_sql(), quote_identifier(alias)),
            None => self.to_sql(),
        }
    }
}

impl From<&str> for Column {
    fn from(text: &str) -> Self {
        Column::parse(text)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_select_sql())
    }
}

fn clean_name(name: &str) -> String {
    name.trim_matches(|c: char| matches!(c, '"' | '`' | '\'' | '[' | ']') || c.is_whitespace())
        .to_string()
}

/// SQL fragment with positional `?` placeholders and their values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expr {
    sql: String,
    params: Vec<Value>,
}

impl Expr {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Expr {
            sql: sql.into(),
            params,
        }
    }

    /// Fragment without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Append SQL text and its parameters
    pub fn push(&mut self, sql: &str, params: impl IntoIterator<Item = Value>) {
        self.sql.push_str(sql);
        self.params.extend(params);
    }

    /// Append SQL text that carries no parameters
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append another fragment
    pub fn append(&mut self, other: Expr) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
