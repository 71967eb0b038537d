//! Value types for Quarry
//!
//! This module defines:
//! - Value: Unified enum for every scalar that crosses the driver boundary
//! - FromValue: Conversion from a driver value back into a host type
//!
//! ## Canonical Value Model
//!
//! The Value enum has exactly 8 variants, one per SQL parameter family the
//! engine knows how to type:
//! - Null, Bool, Int, Long, Decimal, String, DateTime, Bytes
//!
//! ### Type Rules
//!
//! - No implicit type coercions between variants when comparing
//! - `Int(1) != Long(1)`: different variants are NEVER equal
//! - Decimal uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Format used whenever a date-time is rendered as SQL text.
///
/// Fixed and locale-free so that literals and parameters read the same on
/// every server language.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical value type for parameters, literals and result cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value (`bit`)
    Bool(bool),
    /// 32-bit signed integer (`int`)
    Int(i32),
    /// 64-bit signed integer (`bigint`)
    Long(i64),
    /// Floating point / numeric value (`decimal`)
    Decimal(f64),
    /// UTF-8 string (`varchar`)
    String(String),
    /// Date and time without zone (`datetime`)
    DateTime(NaiveDateTime),
    /// Raw bytes (`varbinary`)
    Bytes(Vec<u8>),
}

// Custom PartialEq implementation for IEEE-754 float semantics
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Long(_) => "Long",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::DateTime(_) => "DateTime",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int or Long value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Get as f64 for any numeric variant
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the date-time if this is a DateTime value
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Length of the value's textual rendering, in characters.
    ///
    /// Used to size string parameters. Null counts as one character.
    pub fn text_len(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Int(i32::from(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Long(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Decimal(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Decimal(f)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// Conversion back to host types
// ============================================================================

/// Conversion from a result cell into a host type.
///
/// `Null` converts to the type's default for plain types and to `None` for
/// `Option<T>`, so a nullable column can be read into either.
pub trait FromValue: Sized {
    /// Convert a borrowed value.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(Error::Conversion {
        reason: format!("expected {}, got {}", expected, value.type_name()),
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Long(l) => Ok(*l != 0),
            other => mismatch("Bool", other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0),
            Value::Int(i) => Ok(*i),
            Value::Long(l) => i32::try_from(*l).map_err(|_| Error::Conversion {
                reason: format!("{} does not fit in a 32-bit integer", l),
            }),
            Value::Bool(b) => Ok(i32::from(*b)),
            other => mismatch("Int", other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0),
            Value::Int(i) => Ok(i64::from(*i)),
            Value::Long(l) => Ok(*l),
            other => mismatch("Long", other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0.0),
            other => other.as_f64().map_or_else(|| mismatch("Decimal", other), Ok),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            Value::Bytes(_) => mismatch("String", value),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(NaiveDateTime::default()),
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|e| {
                Error::Conversion {
                    reason: format!("invalid date-time '{}': {}", s, e),
                }
            }),
            other => mismatch("DateTime", other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b.clone()),
            other => mismatch("Bytes", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}
