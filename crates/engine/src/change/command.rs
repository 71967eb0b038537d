use super::plan::{plan, Resolved};
use super::{log_value, ChangeKind, ChangeSet, Payload};
use crate::bulk::stage_and_reconcile;
use crate::config::EngineConfig;
use crate::connection::DbConnection;
use crate::context::EngineContext;
use crate::outcome::{ChangeCounts, Outcome};
use crate::retry::{Attempt, Runner};
use quarry_core::{
    descriptor, is_empty_key, ChangeLogItem, Error, FieldValue, Model, ModelDescriptor, Result,
    Value,
};
use quarry_sql::{group_rounds, StatementBuilder};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accumulates per-key mutations of one model and saves them.
///
/// ```ignore
/// let mut cmd = db.changes::<Client>()?;
/// cmd.insert(new_client)?.delete_by_key(17)?;
/// let outcome = cmd.execute_default();
/// assert_eq!(outcome.value().map(|c| c.inserted), Some(1));
/// ```
///
/// Saving runs inside a transaction: the caller's, when the connection
/// already has one, otherwise one the command opens and then commits or
/// rolls back. Pending changes are cleared only on success.
pub struct ChangeCommand<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    changes: ChangeSet<M>,
    bulk_threshold: Option<usize>,
}

impl<M: Model> ChangeCommand<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(ChangeCommand {
            runner: Runner::new(ctx),
            desc: descriptor::<M>()?,
            changes: ChangeSet::new(),
            bulk_threshold: None,
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

    fn register(&mut self, key: M::Key, kind: ChangeKind, payload: Payload<M>) -> Result<&mut Self> {
        let key_value: Value = key.clone().into();
        if is_empty_key(&key_value) {
            return Err(Error::validation(format!(
                "primary key '{}' of '{}' must not be empty",
                self.desc.primary_key().name,
                self.desc.table()
            )));
        }
        if let Payload::Fields(fields) = &payload {
            for field in fields {
                self.desc.require_field(&field.field)?;
            }
        }
        self.changes.register(key, kind, payload);
        Ok(self)
    }

    fn register_fields(
        &mut self,
        key: M::Key,
        kind: ChangeKind,
        fields: Vec<FieldValue>,
    ) -> Result<&mut Self> {
        let key_name = &self.desc.primary_key().name;
        let settable = fields
            .iter()
            .any(|f| !f.field.eq_ignore_ascii_case(key_name));
        if kind != ChangeKind::Insert && !settable {
            return Err(Error::validation(format!(
                "{:?} of '{}' needs at least one field to set",
                kind,
                self.desc.table()
            )));
        }
        self.register(key, kind, Payload::Fields(fields))
    }

    /// Insert a full row
    pub fn insert(&mut self, model: M) -> Result<&mut Self> {
        self.register(model.key(), ChangeKind::Insert, Payload::Model(model))
    }

    /// Update a full row
    pub fn update(&mut self, model: M) -> Result<&mut Self> {
        self.register(model.key(), ChangeKind::Update, Payload::Model(model))
    }

    /// Insert or update a full row, decided by an existence probe
    pub fn insert_or_update(&mut self, model: M) -> Result<&mut Self> {
        self.register(model.key(), ChangeKind::InsertOrUpdate, Payload::Model(model))
    }

    /// Delete the row of `model`
    pub fn delete(&mut self, model: M) -> Result<&mut Self> {
        self.register(model.key(), ChangeKind::Delete, Payload::Model(model))
    }

    /// Insert a key with specific fields
    pub fn insert_fields(&mut self, key: M::Key, fields: Vec<FieldValue>) -> Result<&mut Self> {
        self.register_fields(key, ChangeKind::Insert, fields)
    }

    /// Update specific fields of one row
    pub fn update_fields(&mut self, key: M::Key, fields: Vec<FieldValue>) -> Result<&mut Self> {
        self.register_fields(key, ChangeKind::Update, fields)
    }

    /// Insert or update specific fields of one row
    pub fn insert_or_update_fields(
        &mut self,
        key: M::Key,
        fields: Vec<FieldValue>,
    ) -> Result<&mut Self> {
        self.register_fields(key, ChangeKind::InsertOrUpdate, fields)
    }

    /// Delete by key without a model
    pub fn delete_by_key(&mut self, key: M::Key) -> Result<&mut Self> {
        self.register(key, ChangeKind::Delete, Payload::KeyOnly)
    }

    /// Override the bulk threshold for this command; `None` restores the
    /// configured value.
    pub fn set_bulk_threshold(&mut self, threshold: Option<usize>) -> &mut Self {
        self.bulk_threshold = threshold;
        self
    }

    /// Effective bulk threshold
    pub fn bulk_threshold(&self) -> usize {
        self.bulk_threshold
            .unwrap_or(self.runner.config().bulk_threshold)
    }

    /// Pending changes
    pub fn changes(&self) -> &ChangeSet<M> {
        &self.changes
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Pending changes as a change list
    pub fn list_changes(&self) -> Vec<ChangeLogItem> {
        self.changes.log_items(&self.desc)
    }

    /// Drop every pending change
    pub fn reset(&mut self) -> &mut Self {
        self.changes.clear();
        self
    }

    /// Save pending changes.
    pub fn execute(
        &mut self,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Outcome<ChangeCounts> {
        if self.changes.is_empty() {
            return Outcome::success(ChangeCounts::default());
        }
        if self.runner.config().log_changes {
            self.log_pending();
        }

        let desc = Arc::clone(&self.desc);
        let threshold = self.bulk_threshold();
        let changes = &self.changes;
        let result = self
            .runner
            .run("change", keep_connection_open, retry_on_error, |attempt| {
                apply(attempt, &desc, changes, threshold)
            });

        match result {
            Ok(counts) => {
                info!(
                    target: "quarry::change",
                    table = desc.table(),
                    inserted = counts.inserted,
                    updated = counts.updated,
                    deleted = counts.deleted,
                    affected = counts.affected,
                    bulk_staged = counts.bulk_staged,
                    "Saved changes"
                );
                self.changes.clear();
                Outcome::success(counts)
            }
            Err(e) => Outcome::capture("change", Err(e.with_changes(self.list_changes()))),
        }
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<ChangeCounts> {
        self.execute(false, true)
    }

    fn log_pending(&self) {
        let log_field = M::log_field();
        for item in self.list_changes() {
            let fields = serde_json::to_string(&item.fields).unwrap_or_default();
            debug!(
                target: "quarry::change",
                table = %item.table,
                state = %item.state,
                key = %item.key_value,
                log = %log_value(&item, log_field),
                fields = %fields,
                "Saving change"
            );
        }
    }
}

fn apply<M: Model>(
    attempt: &mut Attempt<'_>,
    desc: &ModelDescriptor,
    changes: &ChangeSet<M>,
    threshold: usize,
) -> Result<ChangeCounts> {
    let connection = attempt.connection();
    let config = attempt.config();
    let owns_transaction = !connection.has_transaction();
    if owns_transaction {
        connection.begin_transaction()?;
    }

    let result = apply_changes(connection, config, desc, changes, threshold);
    if !owns_transaction {
        return result;
    }
    match result {
        Ok(counts) => {
            connection.commit()?;
            Ok(counts)
        }
        Err(e) => {
            if let Err(rollback) = connection.rollback() {
                warn!(target: "quarry::change", error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

fn apply_changes<M: Model>(
    connection: &DbConnection,
    config: &EngineConfig,
    desc: &ModelDescriptor,
    changes: &ChangeSet<M>,
    threshold: usize,
) -> Result<ChangeCounts> {
    let limits = config.limits();
    let builder = StatementBuilder::new(desc, limits);

    let mut resolved = Vec::with_capacity(changes.len());
    for change in changes.iter() {
        let key: Value = change.key().clone().into();
        let kind = match change.kind() {
            ChangeKind::InsertOrUpdate => {
                let probe = builder.exists_by_key(&key);
                let found = connection
                    .session()
                    .scalar(&probe, config.probe_timeout())?;
                if found.is_null() {
                    ChangeKind::Insert
                } else {
                    ChangeKind::Update
                }
            }
            kind => kind,
        };
        resolved.push(Resolved {
            key,
            kind,
            payload: change.payload(),
        });
    }

    let plan = plan(desc, &resolved, threshold, limits)?;
    let rounds = group_rounds(plan.statements, &limits)?;
    let mut counts = plan.counts;

    if !plan.staged.is_empty() {
        stage_and_reconcile(connection, desc, &plan.staged, config)?;
    }
    for round in &rounds {
        counts.affected += connection
            .session()
            .execute(round, config.mutation_timeout())?;
    }
    debug!(
        target: "quarry::change",
        table = desc.table(),
        rounds = rounds.len(),
        staged = counts.bulk_staged,
        "Applied change plan"
    );
    Ok(counts)
}
