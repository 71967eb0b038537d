//! Result rows and tables
//!
//! Rows share their column list through an `Arc`, so a table of many rows
//! holds the names once.

use crate::error::{Error, Result};
use crate::value::{FromValue, Value};
use std::sync::Arc;

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` must line up with `columns`.
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Row { columns, values }
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Cell values, in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, keeping its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the row has no cells
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell by position
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Cell by column name, ignoring ASCII case
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Cell by column name, converted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversion` when the column is missing or the cell
    /// cannot be converted.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        match self.get(column) {
            Some(v) => T::from_value(v),
            None => Err(Error::Conversion {
                reason: format!("column '{}' not present in result", column),
            }),
        }
    }

    /// Cell by column name, converted, with the type default when absent.
    pub fn get_or_default<T: FromValue + Default>(&self, column: &str) -> Result<T> {
        match self.get(column) {
            Some(v) => T::from_value(v),
            None => Ok(T::default()),
        }
    }
}

/// A materialized result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Arc<Vec<String>>,
    rows: Vec<Row>,
}

impl Table {
    /// Empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns: Arc::new(columns),
            rows: Vec::new(),
        }
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` when the value count does not match the
    /// column count.
    pub fn push(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(Row::new(Arc::clone(&self.columns), values));
        Ok(())
    }

    /// Builder-style [`push`](Self::push)
    pub fn with_row(mut self, values: Vec<Value>) -> Result<Self> {
        self.push(values)?;
        Ok(self)
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume into rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.at(0))
    }
}
