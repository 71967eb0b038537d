//! Static model descriptions
//!
//! A model type describes its table once through [`Model::describe`]. The
//! resulting [`ModelDescriptor`] is validated when built (exactly one primary
//! key, unique column names) and cached per type by the registry, so every
//! command works from the same metadata without runtime reflection.
//!
//! ## Field order
//!
//! [`Model::values`] returns one value per descriptor field, in declaration
//! order. Ignored fields may report anything; their values are never sent.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;
use std::fmt;

/// Declared type of a model field.
///
/// Drives parameter typing and staging-table DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Text
    String,
    /// Boolean (`bit`)
    Bool,
    /// Date and time
    DateTime,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Decimal / floating point
    Decimal,
    /// Binary
    Bytes,
    /// Anything else, sent as text
    Other,
}

impl FieldType {
    /// Value sent in place of `Null` for a non-nullable field.
    ///
    /// Text becomes `''`, numbers `0` and booleans `false`. Types without a
    /// sensible default keep `Null`.
    pub fn default_value(self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Bool => Value::Bool(false),
            FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Decimal => Value::Decimal(0.0),
            FieldType::DateTime | FieldType::Bytes | FieldType::Other => Value::Null,
        }
    }

    /// Infer a field type from a value, for parameters that have no model.
    pub fn of(value: &Value) -> FieldType {
        match value {
            Value::Null => FieldType::Other,
            Value::Bool(_) => FieldType::Bool,
            Value::Int(_) => FieldType::Int,
            Value::Long(_) => FieldType::Long,
            Value::Decimal(_) => FieldType::Decimal,
            Value::String(_) => FieldType::String,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Bytes(_) => FieldType::Bytes,
        }
    }
}

/// Metadata for one column of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Primary key column
    pub is_primary_key: bool,
    /// Server-generated identity column
    pub is_identity: bool,
    /// Accepts `NULL`
    pub is_nullable: bool,
    /// Not mapped to the table
    pub is_ignored: bool,
}

impl FieldDescriptor {
    /// A plain, non-nullable column.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            field_type,
            is_primary_key: false,
            is_identity: false,
            is_nullable: false,
            is_ignored: false,
        }
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Mark as an identity column.
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    /// Exclude from every generated statement.
    pub fn ignored(mut self) -> Self {
        self.is_ignored = true;
        self
    }

    /// Replace `Null` with the type default when the column is not nullable.
    pub fn coerce(&self, value: Value) -> Value {
        if value.is_null() && !self.is_nullable {
            self.field_type.default_value()
        } else {
            value
        }
    }
}

/// Validated description of a model's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    table: String,
    fields: Vec<FieldDescriptor>,
    key_index: usize,
}

impl ModelDescriptor {
    /// Build and validate a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when the table name is empty, no mapped
    /// field exists, column names repeat (case-insensitively), or the mapped
    /// fields do not contain exactly one primary key.
    pub fn new(table: impl Into<String>, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(Error::validation("table name must not be empty"));
        }

        for (i, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(Error::validation(format!(
                    "field {} of '{}' has an empty name",
                    i, table
                )));
            }
            if fields[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(Error::validation(format!(
                    "field '{}' declared twice on '{}'",
                    field.name, table
                )));
            }
        }

        if fields.iter().all(|f| f.is_ignored) {
            return Err(Error::validation(format!(
                "'{}' has no mapped fields",
                table
            )));
        }

        let keys: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_primary_key && !f.is_ignored)
            .map(|(i, _)| i)
            .collect();
        let key_index = match keys.as_slice() {
            [single] => *single,
            [] => {
                return Err(Error::validation(format!(
                    "'{}' declares no primary key",
                    table
                )))
            }
            _ => {
                return Err(Error::validation(format!(
                    "'{}' declares {} primary keys, expected one",
                    table,
                    keys.len()
                )))
            }
        };

        Ok(ModelDescriptor {
            table,
            fields,
            key_index,
        })
    }

    /// Target table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All declared fields, ignored ones included
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Fields mapped to the table, in declaration order
    pub fn mapped_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_ignored)
    }

    /// Mapped fields written by a full-row insert (identity columns omitted)
    pub fn insert_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.mapped_fields().filter(|f| !f.is_identity)
    }

    /// Number of mapped fields
    pub fn column_count(&self) -> usize {
        self.mapped_fields().count()
    }

    /// The primary key field
    pub fn primary_key(&self) -> &FieldDescriptor {
        &self.fields[self.key_index]
    }

    /// Look up a mapped field by name, ignoring ASCII case.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.mapped_fields()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Like [`field`](Self::field) but fails with `Error::UnknownField`.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            table: self.table.clone(),
            field: name.to_string(),
        })
    }

    /// Pair mapped fields with a model's values, coercing nulls.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` when the number of values does not match the
    /// number of declared fields.
    pub fn bind(&self, values: Vec<Value>) -> Result<Vec<(&FieldDescriptor, Value)>> {
        if values.len() != self.fields.len() {
            return Err(Error::Internal(format!(
                "'{}' declares {} fields but the model produced {} values",
                self.table,
                self.fields.len(),
                values.len()
            )));
        }
        Ok(self
            .fields
            .iter()
            .zip(values)
            .filter(|(f, _)| !f.is_ignored)
            .map(|(f, v)| (f, f.coerce(v)))
            .collect())
    }
}

/// A row type mapped to one table.
///
/// # Example
///
/// ```
/// use quarry_core::{FieldDescriptor, FieldType, FromRow, Model, ModelDescriptor, Result, Row, Value};
///
/// struct Tag {
///     id: i32,
///     label: String,
/// }
///
/// impl FromRow for Tag {
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Tag { id: row.get_as("Id")?, label: row.get_as("Label")? })
///     }
/// }
///
/// impl Model for Tag {
///     type Key = i32;
///
///     fn describe() -> Result<ModelDescriptor> {
///         ModelDescriptor::new(
///             "Tags",
///             vec![
///                 FieldDescriptor::new("Id", FieldType::Int).primary_key(),
///                 FieldDescriptor::new("Label", FieldType::String),
///             ],
///         )
///     }
///
///     fn key(&self) -> i32 {
///         self.id
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![self.id.into(), self.label.clone().into()]
///     }
/// }
///
/// assert_eq!(Tag::describe().unwrap().primary_key().name, "Id");
/// ```
pub trait Model: FromRow + Send + 'static {
    /// Primary key type
    type Key: Ord + Clone + fmt::Debug + Into<Value> + Send;

    /// Describe the table. Called once per type; the result is cached.
    fn describe() -> Result<ModelDescriptor>;

    /// Primary key of this row
    fn key(&self) -> Self::Key;

    /// One value per descriptor field, in declaration order
    fn values(&self) -> Vec<Value>;

    /// Field written to the per-change debug log (defaults to the key)
    fn log_field() -> Option<&'static str> {
        None
    }
}

/// Construction from a result row.
pub trait FromRow: Sized {
    /// Build from one row; column lookup is case-insensitive.
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

/// A result shape that differs from the model it is selected from.
///
/// The listed columns are matched to the model's fields by name, ignoring
/// case, unless an explicit mapping says otherwise.
pub trait Projection: FromRow {
    /// Target column names
    fn columns() -> Vec<String>;
}

/// A single column assignment, used for sparse inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Column name
    pub field: String,
    /// New value
    pub value: Value,
}

impl FieldValue {
    /// Create an assignment.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// True when a key value cannot identify a row.
pub fn is_empty_key(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
