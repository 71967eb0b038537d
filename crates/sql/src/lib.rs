//! T-SQL synthesis for Quarry
//!
//! Everything in this crate is pure: given table metadata, conditions and
//! values it produces SQL text with typed parameters.
//!
//! - predicate: condition sets compiled to WHERE clauses
//! - statement: parameters and statements
//! - literal: inline literals and identifier quoting
//! - builder: INSERT/UPDATE/DELETE/probe/aggregate statements
//! - select: projection, TOP-N and paging
//! - temp: temporary table names, DDL and `SELECT INTO` rewriting
//! - reconcile: bulk reconciliation script
//! - limiter: parameter ceiling and round-trip grouping

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod limiter;
pub mod literal;
pub mod predicate;
pub mod reconcile;
pub mod select;
pub mod statement;
pub mod temp;

pub use builder::StatementBuilder;
pub use limiter::{check_ceiling, group_rounds};
pub use literal::{literal, quote_ident};
pub use predicate::{Conditions, Predicate, PredicateKind};
pub use reconcile::reconcile_script;
pub use select::{Column, OrderBy, PageRequest, RowLimit, SelectQuery};
pub use statement::{unique_name, Parameter, SqlType, Statement};
pub use temp::{
    change_type_table_sql, create_table_sql, drop_table_sql, rewrite_select_into, staging_names,
    temp_table_name, CHANGE_KEY_COLUMN, CHANGE_TYPE_COLUMN,
};
