//! Bulk loading
//!
//! Large change sets are staged into two global temporary tables, one with
//! `(PK, ChangeType)` rows and one with full rows, through the driver's bulk
//! row transfer. A single script then applies inserts, updates and deletes
//! against the target table. Staging tables are dropped whatever happens.
//!
//! [`BulkCommand`] is the direct variant: it bulk-copies models straight into
//! their table.

use crate::change::ChangeKind;
use crate::connection::DbConnection;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::driver::BulkCopyRequest;
use crate::outcome::Outcome;
use crate::retry::Runner;
use quarry_core::{descriptor, Model, ModelDescriptor, Result, Value};
use quarry_sql::{
    change_type_table_sql, create_table_sql, drop_table_sql, reconcile_script, staging_names,
    Statement, CHANGE_KEY_COLUMN, CHANGE_TYPE_COLUMN,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One change routed to the bulk path
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StagedChange {
    pub(crate) key: Value,
    pub(crate) kind: ChangeKind,
    /// Full row for inserts and updates
    pub(crate) values: Option<Vec<Value>>,
}

fn op_code(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => "I",
        ChangeKind::Update => "U",
        ChangeKind::Delete | ChangeKind::InsertOrUpdate => "D",
    }
}

/// Stage `changes` and reconcile them into `desc`'s table on `connection`.
///
/// Returns the number of staged change rows.
pub(crate) fn stage_and_reconcile(
    connection: &DbConnection,
    desc: &ModelDescriptor,
    changes: &[StagedChange],
    config: &EngineConfig,
) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }
    let (types_table, models_table) = staging_names();
    let result = stage(connection, desc, changes, config, &types_table, &models_table);

    for table in [&types_table, &models_table] {
        let dropped = connection
            .session()
            .execute(&Statement::text(drop_table_sql(table)), config.mutation_timeout());
        if let Err(e) = dropped {
            warn!(target: "quarry::bulk", table = %table, error = %e, "Failed to drop staging table");
        }
    }
    result
}

fn stage(
    connection: &DbConnection,
    desc: &ModelDescriptor,
    changes: &[StagedChange],
    config: &EngineConfig,
    types_table: &str,
    models_table: &str,
) -> Result<usize> {
    let key = desc.primary_key();
    let mut session = connection.session();
    session.execute(
        &Statement::text(change_type_table_sql(types_table, key)),
        config.mutation_timeout(),
    )?;
    session.execute(
        &Statement::text(create_table_sql(models_table, desc.mapped_fields())),
        config.mutation_timeout(),
    )?;

    let type_columns = vec![CHANGE_KEY_COLUMN.to_string(), CHANGE_TYPE_COLUMN.to_string()];
    let type_rows: Vec<Vec<Value>> = changes
        .iter()
        .map(|c| vec![c.key.clone(), Value::from(op_code(c.kind))])
        .collect();
    session.bulk_copy(BulkCopyRequest {
        table: types_table,
        columns: &type_columns,
        rows: &type_rows,
        batch_size: config.bulk_batch_size(type_columns.len()),
        timeout: config.bulk_copy_timeout(),
    })?;

    let model_columns: Vec<String> = desc.mapped_fields().map(|f| f.name.clone()).collect();
    let mut model_rows = Vec::new();
    for change in changes {
        if let Some(values) = &change.values {
            let row = desc
                .bind(values.clone())?
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            model_rows.push(row);
        }
    }
    if !model_rows.is_empty() {
        session.bulk_copy(BulkCopyRequest {
            table: models_table,
            columns: &model_columns,
            rows: &model_rows,
            batch_size: config.bulk_batch_size(model_columns.len()),
            timeout: config.bulk_copy_timeout(),
        })?;
    }
    debug!(
        target: "quarry::bulk",
        table = desc.table(),
        changes = type_rows.len(),
        models = model_rows.len(),
        "Staged bulk changes"
    );

    let script = reconcile_script(desc, types_table, models_table);
    let affected = session.execute(&Statement::text(script), config.mutation_timeout())?;
    info!(
        target: "quarry::bulk",
        table = desc.table(),
        staged = changes.len(),
        affected,
        "Reconciled bulk changes"
    );
    Ok(changes.len())
}

/// Direct bulk copy of models into their table
pub struct BulkCommand<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    models: Vec<M>,
}

impl<M: Model> BulkCommand<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(BulkCommand {
            runner: Runner::new(ctx),
            desc: descriptor::<M>()?,
            models: Vec::new(),
        })
    }

    /// Run on a caller-supplied connection
    pub fn on(mut self, connection: &DbConnection) -> Self {
        self.runner.set_borrowed(connection.clone());
        self
    }

    /// Open connections with this connection string
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.runner.set_connection_string(connection_string.into());
        self
    }

    /// Queue one model
    pub fn add(&mut self, model: M) -> &mut Self {
        self.models.push(model);
        self
    }

    /// Queue many models
    pub fn extend(&mut self, models: impl IntoIterator<Item = M>) -> &mut Self {
        self.models.extend(models);
        self
    }

    /// Models queued
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Copy the queued models; returns rows written.
    ///
    /// Identity columns are left to the server. Once the transfer starts no
    /// further attempt is made, since a partial copy cannot be repeated
    /// safely. The queue is cleared on success.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<u64> {
        let desc = Arc::clone(&self.desc);
        let models = &self.models;
        let result = self
            .runner
            .run("bulk", keep_connection_open, retry_on_error, |attempt| {
                let columns: Vec<String> = desc.insert_fields().map(|f| f.name.clone()).collect();
                let mut rows = Vec::with_capacity(models.len());
                for model in models {
                    let row: Vec<Value> = desc
                        .bind(model.values())?
                        .into_iter()
                        .filter(|(f, _)| !f.is_identity)
                        .map(|(_, v)| v)
                        .collect();
                    rows.push(row);
                }
                if rows.is_empty() {
                    return Ok(0);
                }
                let config = attempt.config();
                attempt.cancel_retry();
                let written = attempt.connection().session().bulk_copy(BulkCopyRequest {
                    table: desc.table(),
                    columns: &columns,
                    rows: &rows,
                    batch_size: config.bulk_batch_size(columns.len()),
                    timeout: config.bulk_copy_timeout(),
                })?;
                info!(target: "quarry::bulk", table = desc.table(), rows = written, "Bulk copied rows");
                Ok(written)
            });
        if result.is_ok() {
            self.models.clear();
        }
        Outcome::capture("bulk", result)
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<u64> {
        self.execute(false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{Reply, RequestKind, ScriptedConnector};
    use crate::driver::Connector;
    use quarry_core::{FieldDescriptor, FieldType};

    fn desc() -> ModelDescriptor {
        ModelDescriptor::new(
            "Items",
            vec![
                FieldDescriptor::new("Id", FieldType::Int).primary_key(),
                FieldDescriptor::new("Name", FieldType::String),
            ],
        )
        .unwrap()
    }

    fn staged() -> Vec<StagedChange> {
        vec![
            StagedChange {
                key: Value::Int(1),
                kind: ChangeKind::Insert,
                values: Some(vec![Value::Int(1), Value::from("a")]),
            },
            StagedChange {
                key: Value::Int(2),
                kind: ChangeKind::Delete,
                values: None,
            },
        ]
    }

    #[test]
    fn test_stages_both_tables_and_drops_them() {
        let connector = ScriptedConnector::silent();
        let connection = DbConnection::from_session(connector.connect("").unwrap());
        let staged_rows =
            stage_and_reconcile(&connection, &desc(), &staged(), &EngineConfig::default()).unwrap();
        assert_eq!(staged_rows, 2);

        let copies = connector.requests_of(RequestKind::BulkCopy);
        assert_eq!(copies.len(), 2);
        assert!(copies[0].sql.starts_with("##tbChangesType_"));
        assert_eq!(copies[0].rows[1], vec![Value::Int(2), Value::from("D")]);
        assert!(copies[1].sql.starts_with("##tbChangesModel_"));
        assert_eq!(copies[1].rows.len(), 1);
        assert_eq!(connector.matching("DROP TABLE").len(), 2);
        assert_eq!(connector.matching("UPDATE T SET").len(), 1);
    }

    #[test]
    fn test_drops_staging_tables_after_failure() {
        let connector = ScriptedConnector::new(|req| {
            if req.sql.starts_with("INSERT INTO [Items]") {
                Reply::Error(quarry_core::DbError::from_server_code(2627, "duplicate"))
            } else {
                Reply::Affected(0)
            }
        });
        let connection = DbConnection::from_session(connector.connect("").unwrap());
        let err = stage_and_reconcile(&connection, &desc(), &staged(), &EngineConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), quarry_core::ErrorKind::Constraint);
        assert_eq!(connector.matching("DROP TABLE").len(), 2);
    }

    #[test]
    fn test_key_only_changes_skip_model_copy() {
        let connector = ScriptedConnector::silent();
        let connection = DbConnection::from_session(connector.connect("").unwrap());
        let only_deletes = vec![StagedChange {
            key: Value::Int(9),
            kind: ChangeKind::Delete,
            values: None,
        }];
        stage_and_reconcile(&connection, &desc(), &only_deletes, &EngineConfig::default())
            .unwrap();
        assert_eq!(connector.requests_of(RequestKind::BulkCopy).len(), 1);
    }
}
