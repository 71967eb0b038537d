use super::{CountCommand, ExistsCommand};
use crate::connection::DbConnection;
use crate::context::EngineContext;
use crate::outcome::Outcome;
use crate::retry::Runner;
use quarry_core::{descriptor, Error, Model, ModelDescriptor, Projection, Result};
use quarry_sql::{
    temp_table_name, Column, Conditions, OrderBy, PageRequest, RowLimit, SelectQuery, Statement,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// SELECT over one model's table
///
/// Rows come back as `M`, or as any [`Projection`] through
/// [`project`](Self::project). Output can instead be redirected into a
/// temporary table with [`into_temp_table`](Self::into_temp_table).
pub struct SelectCommand<M: Model> {
    runner: Runner,
    desc: Arc<ModelDescriptor>,
    conditions: Conditions,
    limit: RowLimit,
    ignored: Vec<String>,
    // (target, source)
    mapping: Vec<(String, String)>,
    _model: PhantomData<fn() -> M>,
}

impl_conditional!(SelectCommand);

impl<M: Model> SelectCommand<M> {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Result<Self> {
        Ok(SelectCommand {
            runner: Runner::new(ctx),
            desc: descriptor::<M>()?,
            conditions: Conditions::new(),
            limit: RowLimit::All,
            ignored: Vec::new(),
            mapping: Vec::new(),
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

    /// Return at most `n` rows in the given order (which may be empty).
    pub fn top(&mut self, n: usize, order_by: Vec<OrderBy>) -> Result<&mut Self> {
        let order_by = self.resolve_order(order_by)?;
        self.limit = RowLimit::Top { n, order_by };
        Ok(self)
    }

    /// Return rows `skip+1 ..= skip+take` of the given order.
    ///
    /// # Errors
    ///
    /// `take <= 0`, an empty ordering or an unknown order field is a
    /// validation error.
    pub fn page(&mut self, skip: i64, take: i64, order_by: Vec<OrderBy>) -> Result<&mut Self> {
        let order_by = self.resolve_order(order_by)?;
        self.limit = RowLimit::Page(PageRequest::new(skip, take, order_by)?);
        Ok(self)
    }

    /// Remove TOP or paging
    pub fn clear_paging(&mut self) -> &mut Self {
        self.limit = RowLimit::All;
        self
    }

    /// Current row limit
    pub fn limit(&self) -> &RowLimit {
        &self.limit
    }

    /// Leave these fields out of the projection.
    pub fn ignore_columns(&mut self, fields: &[&str]) -> Result<&mut Self> {
        for field in fields {
            let name = self.desc.require_field(field)?.name.clone();
            if !self.is_ignored(&name) {
                self.ignored.push(name);
            }
        }
        Ok(self)
    }

    /// Fill projection column `target` from model field `source`.
    pub fn map_column(&mut self, target: &str, source: &str) -> Result<&mut Self> {
        let source = self.desc.require_field(source)?.name.clone();
        self.mapping.retain(|(t, _)| !t.eq_ignore_ascii_case(target));
        self.mapping.push((target.to_string(), source));
        Ok(self)
    }

    /// The statement `execute` would run
    pub fn statement(&self) -> Result<Statement> {
        let columns = self.model_columns()?;
        Ok(self.build(&columns, None))
    }

    /// Fetch matching rows as models.
    pub fn execute(&mut self, keep_connection_open: bool, retry_on_error: bool) -> Outcome<Vec<M>> {
        let statement = match self.statement() {
            Ok(statement) => statement,
            Err(e) => return Outcome::capture("select", Err(e)),
        };
        let result = self.fetch(&statement, keep_connection_open, retry_on_error);
        Outcome::capture("select", result)
    }

    /// `execute(false, true)`
    pub fn execute_default(&mut self) -> Outcome<Vec<M>> {
        self.execute(false, true)
    }

    /// Fetch matching rows in another shape.
    ///
    /// Each target column is filled from an explicit mapping when one was
    /// given, otherwise from the model field of the same name (ignoring
    /// case). Targets with no source are left out of the query.
    pub fn project<P: Projection>(
        &mut self,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Outcome<Vec<P>> {
        let statement = match self.projection_columns(&P::columns()) {
            Ok(columns) => self.build(&columns, None),
            Err(e) => return Outcome::capture("select", Err(e)),
        };
        let result = self.fetch(&statement, keep_connection_open, retry_on_error);
        Outcome::capture("select", result)
    }

    /// Write matching rows into a temporary table instead of returning them.
    ///
    /// Returns the table name. A local `#table` only outlives the statement
    /// when the command runs on a shared connection (see [`on`](Self::on)).
    pub fn into_temp_table(
        &mut self,
        name: &str,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Outcome<String> {
        let table = temp_table_name(name);
        let statement = match self.model_columns() {
            Ok(columns) => self.build(&columns, Some(&table)),
            Err(e) => return Outcome::capture("select", Err(e)),
        };
        let result = self
            .runner
            .run("select", keep_connection_open, retry_on_error, |attempt| {
                attempt
                    .connection()
                    .session()
                    .execute(&statement, attempt.config().command_timeout())
            });
        Outcome::capture("select", result.map(|_| table))
    }

    /// COUNT over the same conditions
    pub fn to_count(&self) -> CountCommand<M> {
        CountCommand::from_parts(
            self.runner.fork(),
            Arc::clone(&self.desc),
            self.conditions.clone(),
        )
    }

    /// EXISTS over the same conditions
    pub fn to_exists(&self) -> ExistsCommand<M> {
        ExistsCommand::from_parts(
            self.runner.fork(),
            Arc::clone(&self.desc),
            self.conditions.clone(),
        )
    }

    fn fetch<T: quarry_core::FromRow>(
        &mut self,
        statement: &Statement,
        keep_connection_open: bool,
        retry_on_error: bool,
    ) -> Result<Vec<T>> {
        self.runner
            .run("select", keep_connection_open, retry_on_error, |attempt| {
                let table = attempt
                    .connection()
                    .session()
                    .query(statement, attempt.config().command_timeout())?;
                table.rows().iter().map(T::from_row).collect()
            })
    }

    fn build(&self, columns: &[Column], into: Option<&str>) -> Statement {
        SelectQuery {
            table: self.desc.table(),
            columns,
            conditions: &self.conditions,
            limit: &self.limit,
            into,
        }
        .build(&self.runner.config().limits())
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|i| i.eq_ignore_ascii_case(name))
    }

    fn model_columns(&self) -> Result<Vec<Column>> {
        let columns: Vec<Column> = self
            .desc
            .mapped_fields()
            .filter(|f| !self.is_ignored(&f.name))
            .map(|f| Column::plain(f.name.clone()))
            .collect();
        if columns.is_empty() {
            return Err(Error::validation(format!(
                "every column of '{}' is ignored",
                self.desc.table()
            )));
        }
        Ok(columns)
    }

    fn projection_columns(&self, targets: &[String]) -> Result<Vec<Column>> {
        let mut columns = Vec::with_capacity(targets.len());
        for target in targets {
            let mapped = self
                .mapping
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(target));
            if let Some((_, source)) = mapped {
                columns.push(Column::aliased(source.clone(), target.clone()));
            } else if let Some(field) = self.desc.field(target) {
                if !self.is_ignored(&field.name) {
                    columns.push(Column::aliased(field.name.clone(), target.clone()));
                }
            }
        }
        if columns.is_empty() {
            return Err(Error::validation(format!(
                "projection shares no columns with '{}'",
                self.desc.table()
            )));
        }
        Ok(columns)
    }

    fn resolve_order(&self, order_by: Vec<OrderBy>) -> Result<Vec<OrderBy>> {
        order_by
            .into_iter()
            .map(|o| {
                let field = self.desc.require_field(&o.field)?.name.clone();
                Ok(OrderBy {
                    field,
                    descending: o.descending,
                })
            })
            .collect()
    }
}
