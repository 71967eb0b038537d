use crate::connection::DbConnection;
use crate::context::EngineContext;
use crate::outcome::Outcome;
use crate::retry::{Attempt, Runner};
use quarry_core::{FromRow, Result, Row, Table, Value};
use quarry_sql::{rewrite_select_into, temp_table_name, Parameter, Statement};
use std::sync::Arc;
use tracing::debug;

/// Hand-written SQL with named parameters
///
/// ```ignore
/// let mut cmd = db.raw("SELECT [Name] FROM [Clients] WHERE [ID] = @id");
/// cmd.param("id", 7);
/// let names: Vec<Row> = cmd.rows(false, true).into_result()?;
/// ```
///
/// Failures carry the SQL text.
pub struct RawCommand {
    runner: Runner,
    sql: String,
    params: Vec<Parameter>,
}

impl RawCommand {
    pub(crate) fn new(ctx: Arc<EngineContext>, sql: impl Into<String>) -> Self {
        RawCommand {
            runner: Runner::new(ctx),
            sql: sql.into(),
            params: Vec::new(),
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

    /// Bind `@name`; the `@` is optional. Rebinding a name replaces it.
    pub fn param(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let param = Parameter::named(name, value);
        self.params.retain(|p| !p.name.eq_ignore_ascii_case(&param.name));
        self.params.push(param);
        self
    }

    /// SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Rows mapped to `T`
    pub fn query<T: FromRow>(
        &mut self,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Outcome<Vec<T>> {
        self.run(keep_connection_open, retry_on_error, |attempt, statement| {
            let table = attempt
                .connection()
                .session()
                .query(statement, attempt.config().command_timeout())?;
            table.rows().iter().map(T::from_row).collect()
        })
    }

    /// Untyped rows
    pub fn rows(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<Vec<Row>> {
        self.table(keep_connection_open, retry_on_error)
            .map(Table::into_rows)
    }

    /// The whole result set
    pub fn table(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<Table> {
        self.run(keep_connection_open, retry_on_error, |attempt, statement| {
            attempt
                .connection()
                .session()
                .query(statement, attempt.config().command_timeout())
        })
    }

    /// First cell of the result, `Null` when there are no rows
    pub fn scalar(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<Value> {
        self.run(keep_connection_open, retry_on_error, |attempt, statement| {
            attempt
                .connection()
                .session()
                .scalar(statement, attempt.config().command_timeout())
        })
    }

    /// Run as a non-query; returns rows affected.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<u64> {
        self.run(keep_connection_open, retry_on_error, |attempt, statement| {
            attempt
                .connection()
                .session()
                .execute(statement, attempt.config().command_timeout())
        })
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<u64> {
        self.execute(false, true)
    }

    /// Redirect a `SELECT ... FROM` into a temporary table; returns its name.
    ///
    /// The SQL must not already contain `INTO`.
    pub fn into_temp_table(
        &mut self,
        name: &str,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Outcome<String> {
        let table = temp_table_name(name);
        let sql = match rewrite_select_into(&self.sql, &table) {
            Ok(sql) => sql,
            Err(e) => return Outcome::capture("raw", Err(e.with_sql(self.sql.clone()))),
        };
        let statement = Statement::new(sql, self.params.clone());
        self.run_statement(statement, keep_connection_open, retry_on_error, |attempt, s| {
            attempt
                .connection()
                .session()
                .execute(s, attempt.config().command_timeout())
        })
        .map(|_| table)
    }

    fn run<T, F>(&mut self, keep_connection_open: bool, retry_on_error: bool, step: F) -> Outcome<T>
    where
        F: FnMut(&mut Attempt<'_>, &Statement) -> Result<T>,
    {
        let statement = Statement::new(self.sql.clone(), self.params.clone());
        self.run_statement(statement, keep_connection_open, retry_on_error, step)
    }

    fn run_statement<T, F>(
        &mut self,
        statement: Statement,
        keep_connection_open: bool,
        retry_on_error: bool,
        mut step: F,
    ) -> Outcome<T>
    where
        F: FnMut(&mut Attempt<'_>, &Statement) -> Result<T>,
    {
        debug!(
            target: "quarry::raw",
            sql = %statement.sql,
            params = statement.param_count(),
            "Running raw SQL"
        );
        let result = self
            .runner
            .run("raw", keep_connection_open, retry_on_error, |attempt| {
                step(attempt, &statement)
            })
            .map_err(|e| e.with_sql(statement.sql.clone()));
        Outcome::capture("raw", result)
    }
}
