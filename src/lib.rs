//! Quarry - typed SQL command engine for SQL Server
//!
//! Quarry turns statically described row models and declarative conditions
//! into parameterized T-SQL, plans and batches pending mutations, and runs
//! them with bounded retry inside transactions it owns or borrows.
//!
//! # Quick Start
//!
//! ```ignore
//! use quarry::{Conditional, Database};
//!
//! let db = Database::new(connector, "Server=db;Database=shop")?;
//!
//! // Save pending changes in one transaction
//! let mut changes = db.changes::<Client>()?;
//! changes.insert(ann)?.update(bob)?.delete_by_key(17)?;
//! let counts = changes.execute_default().into_result()?;
//!
//! // Query with conditions and paging
//! let mut select = db.select::<Client>()?;
//! select.equals("IsActive", true)?.page(0, 10, vec!["Name".into()])?;
//! let page = select.execute_default().into_result()?;
//! ```
//!
//! # Architecture
//!
//! - `quarry-core`: values, model descriptors, rows, errors
//! - `quarry-sql`: pure SQL synthesis
//! - `quarry-engine`: driver seam, retry engine, commands
//!
//! Everything needed by application code is re-exported here.

pub use quarry_core::{
    descriptor, ChangeLogItem, ChangeState, DbError, Error, ErrorKind, FieldDescriptor, FieldType,
    FieldValue, FromRow, FromValue, Limits, Model, ModelDescriptor, Projection, Result, Row, Table,
    Value,
};
pub use quarry_engine::*;
pub use quarry_sql::{OrderBy, Statement};
