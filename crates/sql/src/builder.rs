//! Statement builder
//!
//! Pure functions from a [`ModelDescriptor`] plus row values or conditions to
//! a [`Statement`]. Nothing here performs I/O.
//!
//! Column values are always parameterized. The primary key in the WHERE
//! clause of single-row UPDATE/DELETE, and in sparse inserts, is inlined as a
//! literal.

use crate::literal::{literal, quote_ident};
use crate::predicate::Conditions;
use crate::statement::{Parameter, Statement};
use quarry_core::{Error, FieldDescriptor, FieldValue, Limits, ModelDescriptor, Result, Value};

/// Builds statements for one model's table
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'a> {
    desc: &'a ModelDescriptor,
    limits: Limits,
}

impl<'a> StatementBuilder<'a> {
    /// Builder for `desc` within `limits`
    pub fn new(desc: &'a ModelDescriptor, limits: Limits) -> Self {
        StatementBuilder { desc, limits }
    }

    /// Descriptor in use
    pub fn descriptor(&self) -> &'a ModelDescriptor {
        self.desc
    }

    /// Quoted table name
    pub fn table(&self) -> String {
        quote_ident(self.desc.table())
    }

    fn key_column(&self) -> String {
        quote_ident(&self.desc.primary_key().name)
    }

    /// `INSERT INTO [T] ([a], [b]) VALUES ` for full-row inserts.
    pub fn insert_header(&self) -> String {
        let columns: Vec<String> = self
            .desc
            .insert_fields()
            .map(|f| quote_ident(&f.name))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ",
            self.table(),
            columns.join(", ")
        )
    }

    /// Multi-row INSERT of full rows. Identity columns are left to the server.
    ///
    /// Each element of `rows` is one model's [`values`](quarry_core::Model::values).
    pub fn insert_rows(&self, rows: Vec<Vec<Value>>) -> Result<Statement> {
        if rows.is_empty() {
            return Err(Error::Internal("insert batch without rows".to_string()));
        }
        let mut sql = self.insert_header();
        let mut params = Vec::new();
        for (i, values) in rows.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let names: Vec<String> = self
                .desc
                .bind(values)?
                .into_iter()
                .filter(|(f, _)| !f.is_identity)
                .map(|(f, v)| {
                    let p = Parameter::new(f.field_type, v, &self.limits);
                    let name = p.name.clone();
                    params.push(p);
                    name
                })
                .collect();
            sql.push('(');
            sql.push_str(&names.join(", "));
            sql.push(')');
        }
        Ok(Statement::new(sql, params))
    }

    /// Resolve sparse assignments against the descriptor.
    ///
    /// The key and identity columns are skipped; a repeated field keeps its
    /// last value.
    fn resolve(&self, fields: &[FieldValue]) -> Result<Vec<(&'a FieldDescriptor, Value)>> {
        let mut out: Vec<(&'a FieldDescriptor, Value)> = Vec::with_capacity(fields.len());
        for fv in fields {
            let field = self.desc.require_field(&fv.field)?;
            if field.is_primary_key || field.is_identity {
                continue;
            }
            let value = field.coerce(fv.value.clone());
            match out.iter_mut().find(|(f, _)| f.name == field.name) {
                Some(slot) => slot.1 = value,
                None => out.push((field, value)),
            }
        }
        Ok(out)
    }

    /// INSERT of a key plus specific fields.
    ///
    /// The key is written as a literal unless it is an identity column.
    pub fn insert_fields(&self, key: &Value, fields: &[FieldValue]) -> Result<Statement> {
        let resolved = self.resolve(fields)?;
        let pk = self.desc.primary_key();
        let mut columns = Vec::with_capacity(resolved.len() + 1);
        let mut values = Vec::with_capacity(resolved.len() + 1);
        let mut params = Vec::with_capacity(resolved.len());
        if !pk.is_identity {
            columns.push(quote_ident(&pk.name));
            values.push(literal(key));
        }
        for (field, value) in resolved {
            let p = Parameter::new(field.field_type, value, &self.limits);
            columns.push(quote_ident(&field.name));
            values.push(p.name.clone());
            params.push(p);
        }
        if columns.is_empty() {
            return Ok(Statement::text(format!(
                "INSERT INTO {} DEFAULT VALUES",
                self.table()
            )));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            values.join(", ")
        );
        Ok(Statement::new(sql, params))
    }

    fn update_sql(&self, key: &Value, sets: Vec<(&FieldDescriptor, Value)>) -> Result<Statement> {
        if sets.is_empty() {
            return Err(Error::validation(format!(
                "update of '{}' has no fields to set",
                self.desc.table()
            )));
        }
        let mut params = Vec::with_capacity(sets.len());
        let assignments: Vec<String> = sets
            .into_iter()
            .map(|(f, v)| {
                let p = Parameter::new(f.field_type, v, &self.limits);
                let text = format!("{} = {}", quote_ident(&f.name), p.name);
                params.push(p);
                text
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table(),
            assignments.join(", "),
            self.key_column(),
            literal(key)
        );
        Ok(Statement::new(sql, params))
    }

    /// Whether a full-row UPDATE has any column to assign.
    pub fn has_settable_fields(&self) -> bool {
        self.desc
            .mapped_fields()
            .any(|f| !f.is_primary_key && !f.is_identity)
    }

    /// UPDATE of every mapped, non-key, non-identity column of a full row.
    pub fn update_row(&self, values: Vec<Value>) -> Result<Statement> {
        let bound = self.desc.bind(values)?;
        let key = bound
            .iter()
            .find(|(f, _)| f.is_primary_key)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null);
        let sets = bound
            .into_iter()
            .filter(|(f, _)| !f.is_primary_key && !f.is_identity)
            .collect();
        self.update_sql(&key, sets)
    }

    /// UPDATE of specific fields of one row.
    pub fn update_fields(&self, key: &Value, fields: &[FieldValue]) -> Result<Statement> {
        let sets = self.resolve(fields)?;
        self.update_sql(key, sets)
    }

    /// `DELETE FROM [T] WHERE [pk] = literal`
    pub fn delete_by_key(&self, key: &Value) -> Statement {
        Statement::text(format!(
            "DELETE FROM {} WHERE {} = {}",
            self.table(),
            self.key_column(),
            literal(key)
        ))
    }

    /// DELETE of every row matching `conditions`, through a key subselect.
    pub fn delete_where(&self, conditions: &Conditions) -> Statement {
        let filter = conditions.compile(&self.limits);
        let sql = format!(
            "DELETE FROM {table} WHERE {key} IN (SELECT {key} FROM {table}{filter})",
            table = self.table(),
            key = self.key_column(),
            filter = filter.sql
        );
        Statement::new(sql, filter.params)
    }

    /// UPDATE of specific fields on every row matching `conditions`.
    pub fn update_where(&self, sets: &[FieldValue], conditions: &Conditions) -> Result<Statement> {
        let resolved = self.resolve(sets)?;
        if resolved.is_empty() {
            return Err(Error::validation(format!(
                "update of '{}' has no fields to set",
                self.desc.table()
            )));
        }
        let mut params = Vec::with_capacity(resolved.len());
        let assignments: Vec<String> = resolved
            .into_iter()
            .map(|(f, v)| {
                let p = Parameter::new(f.field_type, v, &self.limits);
                let text = format!("{} = {}", quote_ident(&f.name), p.name);
                params.push(p);
                text
            })
            .collect();
        let filter = conditions.compile(&self.limits);
        params.extend(filter.params);
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table(),
            assignments.join(", "),
            filter.sql
        );
        Ok(Statement::new(sql, params))
    }

    /// `SELECT TOP 1 1 FROM [T] WHERE [pk] = @p`
    pub fn exists_by_key(&self, key: &Value) -> Statement {
        let pk = self.desc.primary_key();
        let p = Parameter::new(pk.field_type, key.clone(), &self.limits);
        let sql = format!(
            "SELECT TOP 1 1 FROM {} WHERE {} = {}",
            self.table(),
            self.key_column(),
            p.name
        );
        Statement::new(sql, vec![p])
    }

    /// `SELECT COUNT(*) FROM [T] WHERE ...`
    pub fn count(&self, conditions: &Conditions) -> Statement {
        let filter = conditions.compile(&self.limits);
        Statement::new(
            format!("SELECT COUNT(*) FROM {}{}", self.table(), filter.sql),
            filter.params,
        )
    }

    /// Scalar 1 when any row matches `conditions`, else 0.
    pub fn exists(&self, conditions: &Conditions) -> Statement {
        let filter = conditions.compile(&self.limits);
        Statement::new(
            format!(
                "SELECT CASE WHEN EXISTS (SELECT 1 FROM {}{}) THEN 1 ELSE 0 END",
                self.table(),
                filter.sql
            ),
            filter.params,
        )
    }
}
