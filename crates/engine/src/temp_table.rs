//! Temporary tables shaped like a model
//!
//! A [`TemporaryTable`] lives on one session, so it holds its connection for
//! its whole lifetime and never retries on a fresh one. Dropping the handle
//! drops the table (best effort) and closes the connection if the engine
//! opened it.

use crate::connection::{DbConnection, Ownership};
use crate::context::EngineContext;
use crate::driver::BulkCopyRequest;
use quarry_core::{descriptor, Model, ModelDescriptor, Result, Value};
use quarry_sql::{create_table_sql, drop_table_sql, quote_ident, temp_table_name, Statement};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle to a server-side temporary table with `M`'s columns
pub struct TemporaryTable<M: Model> {
    ctx: Arc<EngineContext>,
    connection: DbConnection,
    ownership: Ownership,
    desc: Arc<ModelDescriptor>,
    name: String,
    created: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> TemporaryTable<M> {
    pub(crate) fn new(
        ctx: Arc<EngineContext>,
        connection: DbConnection,
        ownership: Ownership,
        name: &str,
    ) -> Result<Self> {
        Ok(TemporaryTable {
            ctx,
            connection,
            ownership,
            desc: descriptor::<M>()?,
            name: temp_table_name(name),
            created: false,
            _model: PhantomData,
        })
    }

    /// Table name, with its `#` prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session the table lives on; share it with commands that read the table
    pub fn connection(&self) -> &DbConnection {
        &self.connection
    }

    /// Whether `create` has run and `drop_table` has not
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Create the table. Every column is nullable.
    pub fn create(&mut self) -> Result<()> {
        let sql = create_table_sql(&self.name, self.desc.mapped_fields());
        self.connection
            .session()
            .execute(&Statement::text(sql), self.ctx.config.mutation_timeout())?;
        self.created = true;
        debug!(target: "quarry::bulk", table = %self.name, "Created temporary table");
        Ok(())
    }

    /// Bulk-transfer `models` into the table; returns rows written.
    pub fn bulk_insert(&mut self, models: &[M]) -> Result<u64> {
        if models.is_empty() {
            return Ok(0);
        }
        let columns: Vec<String> = self.desc.mapped_fields().map(|f| f.name.clone()).collect();
        let mut rows = Vec::with_capacity(models.len());
        for model in models {
            let row: Vec<Value> = self
                .desc
                .bind(model.values())?
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            rows.push(row);
        }
        let config = &self.ctx.config;
        let written = self.connection.session().bulk_copy(BulkCopyRequest {
            table: &self.name,
            columns: &columns,
            rows: &rows,
            batch_size: config.bulk_batch_size(columns.len()),
            timeout: config.bulk_copy_timeout(),
        })?;
        debug!(target: "quarry::bulk", table = %self.name, rows = written, "Filled temporary table");
        Ok(written)
    }

    /// Read every row back as models
    pub fn read_all(&self) -> Result<Vec<M>> {
        let sql = format!("SELECT * FROM {}", self.name);
        let table = self
            .connection
            .session()
            .query(&Statement::text(sql), self.ctx.config.command_timeout())?;
        table.rows().iter().map(M::from_row).collect()
    }

    /// Drop the table if it exists. Safe to call repeatedly.
    pub fn drop_table(&mut self) -> Result<()> {
        self.connection.session().execute(
            &Statement::text(drop_table_sql(&self.name)),
            self.ctx.config.mutation_timeout(),
        )?;
        self.created = false;
        debug!(target: "quarry::bulk", table = %self.name, "Dropped temporary table");
        Ok(())
    }

    /// Quoted name for use inside hand-written SQL
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }
}

impl<M: Model> Drop for TemporaryTable<M> {
    fn drop(&mut self) {
        if self.created {
            if let Err(e) = self.drop_table() {
                warn!(target: "quarry::bulk", table = %self.name, error = %e, "Failed to drop temporary table");
            }
        }
        if self.ownership == Ownership::Owned {
            if let Err(e) = self.connection.close() {
                warn!(target: "quarry::engine", error = %e, "Failed to close connection");
            }
        }
    }
}
