//! Query helpers
//!
//! - **column**: column reference parsing and parameterised SQL fragments
//! - **sort**: ordered batch updates through a single `CASE` expression
//! - **scope**: `SELECT` builder with LIKE filters, paging and order-by parsing

mod column;
mod scope;
mod sort;

pub use column::{Column, Expr};
pub use scope::{
    like, order_by, paging, parse_order, prefix, suffix, Query, Scope, DEFAULT_PAGE_SIZE,
};
pub use sort::{
    sort, sort_exec, sort_prep, SortOptions, DEFAULT_SORT_COLUMN, FALLBACK_KEY_COLUMN,
};
