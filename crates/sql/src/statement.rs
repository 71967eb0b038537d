//! Statements and typed parameters

use quarry_core::{FieldType, Limits, Value};
use uuid::Uuid;

/// Declared SQL type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// `varchar`
    VarChar,
    /// `bit`
    Bit,
    /// `datetime`
    DateTime,
    /// `int`
    Int,
    /// `bigint`
    BigInt,
    /// `decimal`
    Decimal,
    /// `varbinary`
    VarBinary,
}

impl From<FieldType> for SqlType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String | FieldType::Other => SqlType::VarChar,
            FieldType::Bool => SqlType::Bit,
            FieldType::DateTime => SqlType::DateTime,
            FieldType::Int => SqlType::Int,
            FieldType::Long => SqlType::BigInt,
            FieldType::Decimal => SqlType::Decimal,
            FieldType::Bytes => SqlType::VarBinary,
        }
    }
}

/// A named, typed statement parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name including the leading `@`
    pub name: String,
    /// Bound value
    pub value: Value,
    /// Declared type
    pub sql_type: SqlType,
    /// Declared size, set for `varchar` parameters only
    pub size: Option<usize>,
}

impl Parameter {
    /// Parameter with a fresh unique name, sized from its own value.
    pub fn new(field_type: FieldType, value: Value, limits: &Limits) -> Self {
        let size = sized(field_type, limits, value.text_len());
        Parameter {
            name: unique_name(),
            value,
            sql_type: field_type.into(),
            size,
        }
    }

    /// Parameter with a fresh unique name and an explicit text length.
    ///
    /// Used when several parameters share the longest candidate's size.
    pub fn with_len(field_type: FieldType, value: Value, len: usize, limits: &Limits) -> Self {
        Parameter {
            name: unique_name(),
            value,
            sql_type: field_type.into(),
            size: sized(field_type, limits, len),
        }
    }

    /// Parameter with a caller-chosen name; the type is inferred from the value.
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let name = name.into();
        let name = if name.starts_with('@') {
            name
        } else {
            format!("@{}", name)
        };
        let field_type = FieldType::of(&value);
        let size = sized(field_type, &Limits::default(), value.text_len());
        Parameter {
            name,
            value,
            sql_type: field_type.into(),
            size,
        }
    }
}

fn sized(field_type: FieldType, limits: &Limits, len: usize) -> Option<usize> {
    match SqlType::from(field_type) {
        SqlType::VarChar => Some(limits.string_size(len)),
        _ => None,
    }
}

/// Fresh parameter name of the form `@p_<uuid>`
pub fn unique_name() -> String {
    format!("@p_{}", Uuid::new_v4().simple())
}

/// SQL text with its ordered parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    /// SQL text
    pub sql: String,
    /// Parameters referenced by `sql`
    pub params: Vec<Parameter>,
}

impl Statement {
    /// Statement from text and parameters
    pub fn new(sql: impl Into<String>, params: Vec<Parameter>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }

    /// Statement without parameters
    pub fn text(sql: impl Into<String>) -> Self {
        Statement::new(sql, Vec::new())
    }

    /// Number of parameters
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Append another statement, separated by `;` and a newline.
    pub fn append(&mut self, other: Statement) {
        if !self.sql.is_empty() {
            self.sql.push_str(";\n");
        }
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }
}
