//! Core types and traits for Quarry
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum for parameters and result cells
//! - FieldType / FieldDescriptor / ModelDescriptor: static table metadata
//! - Model / FromRow / Projection: traits implemented by row types
//! - registry: per-type descriptor cache
//! - Row / Table: result sets
//! - Error / ErrorKind / DbError: error hierarchy and failure classification
//! - ChangeLogItem: serializable view of pending changes
//! - Limits: dialect parameter and batching limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change_log;
pub mod error;
pub mod limits;
pub mod model;
pub mod registry;
pub mod row;
pub mod value;

pub use change_log::{ChangeLogItem, ChangeState};
pub use error::{DbError, Error, ErrorKind, Result, LOCK_TIMEOUT_CODE};
pub use limits::Limits;
pub use model::{
    is_empty_key, FieldDescriptor, FieldType, FieldValue, FromRow, Model, ModelDescriptor,
    Projection,
};
pub use registry::descriptor;
pub use row::{Row, Table};
pub use value::{FromValue, Value, DATETIME_FORMAT};
