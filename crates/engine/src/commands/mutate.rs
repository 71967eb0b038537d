use crate::connection::DbConnection;
use crate::context::EngineContext;
use crate::outcome::Outcome;
use crate::retry::Runner;
use quarry_core::{descriptor, Error, FieldValue, Model, ModelDescriptor, Result, Value};
use quarry_sql::{check_ceiling, Conditions, Statement, StatementBuilder};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

fn require_conditions(desc: &ModelDescriptor, conditions: &Conditions, what: &str) -> Result<()> {
    if conditions.is_empty() {
        return Err(Error::validation(format!(
            "{} on '{}' requires at least one condition",
            what,
            desc.table()
        )));
    }
    Ok(())
}

fn run_mutation(
    runner: &mut Runner,
    label: &'static str,
    statement: Result<Statement>,
    keep_connection_open: bool,
    retry_on_error: bool,
) -> Outcome<u64> {
    let statement = match statement {
        Ok(statement) => statement,
        Err(e) => return Outcome::capture(label, Err(e)),
    };
    let result = runner.run(label, keep_connection_open, retry_on_error, |attempt| {
        attempt
            .connection()
            .session()
            .execute(&statement, attempt.config().mutation_timeout())
    });
    if let Ok(rows) = &result {
        info!(target: "quarry::engine", command = label, rows = *rows, "Conditional mutation applied");
    }
    Outcome::capture(label, result)
}

/// DELETE of every row matching the conditions
///
/// At least one condition is required; deleting a whole table is not
/// expressible here.
pub struct DeleteWhere<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    conditions: Conditions,
    _model: PhantomData<fn() -> M>,
}

impl_conditional!(DeleteWhere);

impl<M: Model> DeleteWhere<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(DeleteWhere {
            runner: Runner::new(ctx),
            desc: descriptor::<M>()?,
            conditions: Conditions::new(),
            _model: PhantomData,
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

    /// The statement `execute` would run
    pub fn statement(&self) -> Result<Statement> {
        require_conditions(&self.desc, &self.conditions, "delete")?;
        let limits = self.runner.config().limits();
        let statement = StatementBuilder::new(&self.desc, limits).delete_where(&self.conditions);
        check_ceiling(std::slice::from_ref(&statement), &limits)?;
        Ok(statement)
    }

    /// Delete matching rows; returns rows affected.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<u64> {
        let statement = self.statement();
        run_mutation(
            &mut self.runner,
            "delete",
            statement,
            keep_connection_open,
            retry_on_error,
        )
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<u64> {
        self.execute(false, true)
    }
}

/// UPDATE of specific fields on every row matching the conditions
pub struct UpdateWhere<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    conditions: Conditions,
    sets: Vec<FieldValue>,
    _model: PhantomData<fn() -> M>,
}

impl_conditional!(UpdateWhere);

impl<M: Model> UpdateWhere<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(UpdateWhere {
            runner: Runner::new(ctx),
            desc: descriptor::<M>()?,
            conditions: Conditions::new(),
            sets: Vec::new(),
            _model: PhantomData,
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

    /// Assign `value` to `field`; a later assignment to the same field wins.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let declared = self.desc.require_field(field)?;
        if declared.is_primary_key || declared.is_identity {
            return Err(Error::validation(format!(
                "'{}' of '{}' cannot be assigned",
                declared.name,
                self.desc.table()
            )));
        }
        let name = declared.name.clone();
        self.sets.retain(|s| !s.field.eq_ignore_ascii_case(&name));
        self.sets.push(FieldValue::new(name, value));
        Ok(self)
    }

    /// Pending assignments
    pub fn assignments(&self) -> &[FieldValue] {
        &self.sets
    }

    /// Drop every assignment and condition
    pub fn reset(&mut self) -> &mut Self {
        self.sets.clear();
        self.conditions.clear();
        self
    }

    /// The statement `execute` would run
    pub fn statement(&self) -> Result<Statement> {
        require_conditions(&self.desc, &self.conditions, "update")?;
        let limits = self.runner.config().limits();
        let statement =
            StatementBuilder::new(&self.desc, limits).update_where(&self.sets, &self.conditions)?;
        check_ceiling(std::slice::from_ref(&statement), &limits)?;
        Ok(statement)
    }

    /// Apply the assignments; returns the rows actually affected.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<u64> {
        let statement = self.statement();
        run_mutation(
            &mut self.runner,
            "update",
            statement,
            keep_connection_open,
            retry_on_error,
        )
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<u64> {
        self.execute(false, true)
    }
}
