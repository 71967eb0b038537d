use crate::connection::DbConnection;
use crate::context::EngineContext;
use crate::outcome::Outcome;
use crate::retry::Runner;
use quarry_core::{descriptor, Error, Model, ModelDescriptor, Result, Value};
use quarry_sql::{Conditions, StatementBuilder};
use std::marker::PhantomData;
use std::sync::Arc;

fn count_value(value: &Value) -> Result<i64> {
    match value {
        Value::Null => Ok(0),
        other => other.as_i64().ok_or_else(|| Error::Conversion {
            reason: format!("expected a row count, got {}", other.type_name()),
        }),
    }
}

/// `SELECT COUNT(*)` over matching rows
pub struct CountCommand<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    conditions: Conditions,
    _model: PhantomData<fn() -> M>,
}

impl_conditional!(CountCommand);

impl<M: Model> CountCommand<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(Self::from_parts(
            Runner::new(ctx),
            descriptor::<M>()?,
            Conditions::new(),
        ))
    }

    pub(crate) fn from_parts(
        runner: Runner,
        desc: Arc<ModelDescriptor>,
        conditions: Conditions,
    ) -> Self {
        CountCommand {
            runner,
            desc,
            conditions,
            _model: PhantomData,
        }
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

    /// Count matching rows.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<i64> {
        let statement =
            StatementBuilder::new(&self.desc, self.runner.config().limits()).count(&self.conditions);
        let result = self
            .runner
            .run("count", keep_connection_open, retry_on_error, |attempt| {
                let value = attempt
                    .connection()
                    .session()
                    .scalar(&statement, attempt.config().quick_timeout())?;
                count_value(&value)
            });
        Outcome::capture("count", result)
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<i64> {
        self.execute(false, true)
    }
}

/// Whether any row matches
pub struct ExistsCommand<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    conditions: Conditions,
    _model: PhantomData<fn() -> M>,
}

impl_conditional!(ExistsCommand);

impl<M: Model> ExistsCommand<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(Self::from_parts(
            Runner::new(ctx),
            descriptor::<M>()?,
            Conditions::new(),
        ))
    }

    pub(crate) fn from_parts(
        runner: Runner,
        desc: Arc<ModelDescriptor>,
        conditions: Conditions,
    ) -> Self {
        ExistsCommand {
            runner,
            desc,
            conditions,
            _model: PhantomData,
        }
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

    /// Check for a matching row.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<bool> {
        let statement =
            StatementBuilder::new(&self.desc, self.runner.config().limits()).exists(&self.conditions);
        let result = self
            .runner
            .run("exists", keep_connection_open, retry_on_error, |attempt| {
                let value = attempt
                    .connection()
                    .session()
                    .scalar(&statement, attempt.config().quick_timeout())?;
                Ok(count_value(&value)? > 0)
            });
        Outcome::capture("exists", result)
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<bool> {
        self.execute(false, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_counts_as_zero() {
        assert_eq!(count_value(&Value::Null).unwrap(), 0);
        assert_eq!(count_value(&Value::Int(4)).unwrap(), 4);
        assert_eq!(count_value(&Value::Long(9)).unwrap(), 9);
    }

    #[test]
    fn test_non_numeric_count_is_conversion_error() {
        let err = count_value(&Value::from("many")).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }
}
