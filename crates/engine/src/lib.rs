//! Command engine for Quarry
//!
//! This crate runs the SQL that `quarry-sql` synthesizes:
//! - Database: command factory bound to a driver connector
//! - Change planning: pending per-key mutations, existence probes, batching
//! - Bulk loading: staging tables and set-based reconciliation
//! - Execution: connection ownership, isolation, bounded retry
//! - Diagnostics: blocking-session reports on lock timeouts
//! - Commands: select, count, exists, conditional delete/update, raw SQL
//!
//! The engine is the only component that talks to a driver, through the
//! [`driver::Connector`] and [`driver::Connection`] traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod change;
pub mod commands;
pub mod config;
pub mod connection;
mod context;
pub mod database;
pub mod diagnostics;
pub mod driver;
pub mod outcome;
pub mod retry;
pub mod temp_table;

pub use bulk::BulkCommand;
pub use change::{Change, ChangeCommand, ChangeKind, ChangeSet, Payload};
pub use commands::{
    Conditional, CountCommand, DeleteWhere, ExistsCommand, RawCommand, SelectCommand, UpdateWhere,
};
pub use config::EngineConfig;
pub use connection::{DbConnection, Ownership, SESSION_LANGUAGE};
pub use database::{Database, DatabaseBuilder};
pub use driver::{BulkCopyRequest, Connection, Connector, IsolationLevel};
pub use outcome::{ChangeCounts, Outcome};
pub use retry::{Attempt, Clock, ManualClock, RetryPolicy, SystemClock};
pub use temp_table::TemporaryTable;
