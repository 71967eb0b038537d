//! Command factory
//!
//! A [`Database`] holds a driver connector, a default connection string and
//! the engine configuration. Every command it creates shares them; each
//! command can still be pointed at another connection string or at a
//! caller-supplied connection.
//!
//! ## Connections
//!
//! Commands open and close their own connections unless told otherwise.
//! To run several commands in one transaction, open a connection with
//! [`Database::connect`], begin a transaction on it and hand it to each
//! command with `on(&connection)`:
//!
//! ```ignore
//! let conn = db.connect()?;
//! conn.begin_transaction()?;
//! db.changes::<Client>()?.on(&conn).insert(client)?.execute_default();
//! db.delete_where::<Order>()?.on(&conn).equals("ClientID", 4)?.execute_default();
//! conn.commit()?;
//! ```

mod builder;

pub use builder::DatabaseBuilder;

use crate::bulk::BulkCommand;
use crate::change::ChangeCommand;
use crate::commands::{
    CountCommand, DeleteWhere, ExistsCommand, RawCommand, SelectCommand, UpdateWhere,
};
use crate::config::EngineConfig;
use crate::connection::{DbConnection, Ownership};
use crate::context::EngineContext;
use crate::driver::Connector;
use crate::outcome::Outcome;
use crate::temp_table::TemporaryTable;
use chrono::NaiveDateTime;
use quarry_core::{Error, Model, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const SERVER_TIME_SQL: &str = "SELECT GetDate()";
const TABLE_NAMES_SQL: &str = "SELECT table_name FROM INFORMATION_SCHEMA.TABLES";

/// Entry point: creates commands bound to one connector
#[derive(Clone)]
pub struct Database {
    ctx: Arc<EngineContext>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.ctx.config)
            .finish()
    }
}

impl Database {
    /// Database with the default configuration.
    pub fn new(
        connector: impl Connector + 'static,
        connection_string: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(connector, connection_string).build()
    }

    /// Builder for a configured database
    pub fn builder(
        connector: impl Connector + 'static,
        connection_string: impl Into<String>,
    ) -> DatabaseBuilder {
        DatabaseBuilder::new(Arc::new(connector), connection_string.into())
    }

    pub(crate) fn from_context(ctx: EngineContext) -> Self {
        Database { ctx: Arc::new(ctx) }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Open a connection owned by the caller.
    ///
    /// The engine never commits, rolls back or closes it.
    pub fn connect(&self) -> Result<DbConnection> {
        DbConnection::open(self.ctx.connector.as_ref(), &self.ctx.connection_string)
    }

    /// Pending-change command for `M`
    pub fn changes<M: Model>(&self) -> Result<ChangeCommand<M>> {
        ChangeCommand::new(Arc::clone(&self.ctx))
    }

    /// SELECT over `M`'s table
    pub fn select<M: Model>(&self) -> Result<SelectCommand<M>> {
        SelectCommand::new(Arc::clone(&self.ctx))
    }

    /// COUNT over `M`'s table
    pub fn count<M: Model>(&self) -> Result<CountCommand<M>> {
        CountCommand::new(Arc::clone(&self.ctx))
    }

    /// EXISTS over `M`'s table
    pub fn exists<M: Model>(&self) -> Result<ExistsCommand<M>> {
        ExistsCommand::new(Arc::clone(&self.ctx))
    }

    /// Conditional DELETE on `M`'s table
    pub fn delete_where<M: Model>(&self) -> Result<DeleteWhere<M>> {
        DeleteWhere::new(Arc::clone(&self.ctx))
    }

    /// Conditional UPDATE on `M`'s table
    pub fn update_where<M: Model>(&self) -> Result<UpdateWhere<M>> {
        UpdateWhere::new(Arc::clone(&self.ctx))
    }

    /// Direct bulk copy into `M`'s table
    pub fn bulk<M: Model>(&self) -> Result<BulkCommand<M>> {
        BulkCommand::new(Arc::clone(&self.ctx))
    }

    /// Hand-written SQL
    pub fn raw(&self, sql: impl Into<String>) -> RawCommand {
        RawCommand::new(Arc::clone(&self.ctx), sql)
    }

    /// Temporary table shaped like `M` on a connection of its own.
    ///
    /// An empty `name` yields a fresh global `##temp_<uuid>` name.
    pub fn temp_table<M: Model>(&self, name: &str) -> Result<TemporaryTable<M>> {
        let connection = self.connect()?;
        TemporaryTable::new(Arc::clone(&self.ctx), connection, Ownership::Owned, name)
    }

    /// Temporary table shaped like `M` on a caller-supplied connection
    pub fn temp_table_on<M: Model>(
        &self,
        connection: &DbConnection,
        name: &str,
    ) -> Result<TemporaryTable<M>> {
        TemporaryTable::new(
            Arc::clone(&self.ctx),
            connection.clone(),
            Ownership::Borrowed,
            name,
        )
    }

    /// Current server time
    pub fn server_time(&self) -> Outcome<NaiveDateTime> {
        let value = match self.raw(SERVER_TIME_SQL).scalar(false, true).into_result() {
            Ok(value) => value,
            // already logged by the raw command
            Err(e) => return Outcome::failure(e),
        };
        let result = value.as_datetime().ok_or_else(|| Error::Conversion {
            reason: format!("expected a date-time, got {}", value.type_name()),
        });
        Outcome::capture("server_time", result)
    }

    /// Whether a connection can be opened
    pub fn is_available(&self) -> bool {
        match self.connect() {
            Ok(connection) => {
                if let Err(e) = connection.close() {
                    warn!(target: "quarry::engine", error = %e, "Failed to close connection");
                }
                true
            }
            Err(e) => {
                debug!(target: "quarry::engine", error = %e, "Database unavailable");
                false
            }
        }
    }

    /// Names of the tables in the current database
    pub fn table_names(&self) -> Outcome<Vec<String>> {
        self.raw(TABLE_NAMES_SQL).table(false, true).map(|table| {
            table
                .rows()
                .iter()
                .filter_map(|row| row.at(0).and_then(|v| v.as_str()).map(str::to_string))
                .collect()
        })
    }
}
