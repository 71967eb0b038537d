//! Driver seam
//!
//! The engine consumes a database driver through two traits: a
//! [`Connector`] that opens sessions and a [`Connection`] that executes SQL
//! with typed parameters. Drivers report failures as
//! `Error::Database(DbError)` so the engine can classify them.
//!
//! [`scripted`] provides an in-memory implementation for tests.

pub mod scripted;

use quarry_core::{Result, Table, Value};
use quarry_sql::Statement;
use std::time::Duration;

/// Transaction isolation level
///
/// Every session and transaction the engine drives reads uncommitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// `READ UNCOMMITTED`
    ReadUncommitted,
}

impl IsolationLevel {
    /// T-SQL spelling
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        }
    }
}

/// Rows handed to the driver's bulk row transfer
#[derive(Debug, Clone, Copy)]
pub struct BulkCopyRequest<'a> {
    /// Destination table
    pub table: &'a str,
    /// Destination columns, in row order
    pub columns: &'a [String],
    /// Rows to write
    pub rows: &'a [Vec<Value>],
    /// Rows per batch
    pub batch_size: usize,
    /// Timeout for the whole transfer
    pub timeout: Option<Duration>,
}

/// Opens database sessions.
pub trait Connector: Send + Sync {
    /// Open a session.
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>>;
}

/// One database session.
pub trait Connection: Send {
    /// Run a statement that returns no rows; returns rows affected.
    fn execute(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<u64>;

    /// Run a statement and materialize its first result set.
    fn query(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<Table>;

    /// Run a statement and return the first cell, or `Null` for no rows.
    fn scalar(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<Value> {
        let table = self.query(statement, timeout)?;
        Ok(table.scalar().cloned().unwrap_or(Value::Null))
    }

    /// Begin a transaction.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Set the session isolation level.
    fn set_isolation(&mut self, isolation: IsolationLevel) -> Result<()> {
        let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        self.execute(&Statement::text(sql), None).map(|_| ())
    }

    /// Pin the session language.
    fn set_language(&mut self, language: &str) -> Result<()> {
        let sql = format!("SET LANGUAGE {}", language);
        self.execute(&Statement::text(sql), None).map(|_| ())
    }

    /// Bulk-transfer rows into a table; returns rows written.
    fn bulk_copy(&mut self, request: BulkCopyRequest<'_>) -> Result<u64>;

    /// Close the session.
    fn close(&mut self) -> Result<()>;
}
