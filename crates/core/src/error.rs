//! Error types for Quarry
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Drivers report failures as [`DbError`], which carries a typed
//! [`ErrorKind`] discriminant. Every retry decision in the engine is a pure
//! function of that discriminant, reached through [`Error::kind`].

use crate::change_log::ChangeLogItem;
use thiserror::Error;

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// SQL Server error number for "Lock request time out period exceeded".
pub const LOCK_TIMEOUT_CODE: i32 = 1222;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lock-timeout; the only kind that extends the retry budget
    TransientLock,
    /// Constraint violation (unique key, foreign key, not null, truncation)
    Constraint,
    /// Network or server availability failure
    Connectivity,
    /// Malformed SQL or unknown object
    Syntax,
    /// Rejected while building a command, before any I/O
    Validation,
    /// A single statement exceeds the parameter ceiling
    ParameterLimit,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Whether a failure of this kind may be attempted again.
    ///
    /// Validation and parameter-limit failures are deterministic and never
    /// retried.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Validation | ErrorKind::ParameterLimit)
    }
}

/// A failure reported by a database driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (kind: {kind:?}, code: {code:?})")]
pub struct DbError {
    /// Classified kind
    pub kind: ErrorKind,
    /// Server error number, when the server produced one
    pub code: Option<i32>,
    /// Server or driver message
    pub message: String,
}

impl DbError {
    /// Create a driver error with an explicit kind and no server code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        DbError {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Classify a SQL Server error number.
    pub fn from_server_code(code: i32, message: impl Into<String>) -> Self {
        let kind = match code {
            LOCK_TIMEOUT_CODE => ErrorKind::TransientLock,
            2627 | 2601 | 547 | 515 | 8152 => ErrorKind::Constraint,
            102 | 156 | 207 | 208 | 4104 | 8114 => ErrorKind::Syntax,
            -2 | 2 | 53 | 233 | 10053 | 10054 | 10060 | 40613 => ErrorKind::Connectivity,
            _ => ErrorKind::Other,
        };
        DbError {
            kind,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Shorthand for a lock-timeout error.
    pub fn lock_timeout() -> Self {
        DbError::from_server_code(
            LOCK_TIMEOUT_CODE,
            "Lock request time out period exceeded.",
        )
    }
}

/// Error types for Quarry
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Command rejected before any I/O
    #[error("Validation error: {reason}")]
    Validation {
        /// What was wrong
        reason: String,
    },

    /// A field name not declared by the model
    #[error("Unknown field '{field}' on table '{table}'")]
    UnknownField {
        /// Table the model maps to
        table: String,
        /// Offending field name
        field: String,
    },

    /// Failure reported by the driver
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A single statement needs more parameters than allowed
    #[error("Not allowed more than {max} parameters in one statement (needed {actual})")]
    ParameterLimit {
        /// Configured ceiling
        max: usize,
        /// Parameters the statement needs
        actual: usize,
    },

    /// Failure of a raw SQL statement, with its text
    #[error("Statement failed: {source}\nSQL: {sql}")]
    Statement {
        /// SQL text that failed
        sql: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Failure of a change command, with the in-flight change list
    #[error("Saving {} change(s) failed: {source}", changes.len())]
    Changes {
        /// Pending changes at the time of failure
        changes: Vec<ChangeLogItem>,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A result cell could not be converted to the requested type
    #[error("Conversion error: {reason}")]
    Conversion {
        /// What failed to convert
        reason: String,
    },

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    /// Root classification, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } | Error::UnknownField { .. } => ErrorKind::Validation,
            Error::Database(db) => db.kind,
            Error::ParameterLimit { .. } => ErrorKind::ParameterLimit,
            Error::Statement { source, .. } | Error::Changes { source, .. } => source.kind(),
            Error::Config(_) => ErrorKind::Validation,
            Error::Conversion { .. } | Error::Internal(_) => ErrorKind::Other,
        }
    }

    /// Whether this failure is a lock-timeout.
    pub fn is_transient_lock(&self) -> bool {
        self.kind() == ErrorKind::TransientLock
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Wrap with the SQL text that failed.
    pub fn with_sql(self, sql: impl Into<String>) -> Self {
        Error::Statement {
            sql: sql.into(),
            source: Box::new(self),
        }
    }

    /// Wrap with the change list that was being saved.
    pub fn with_changes(self, changes: Vec<ChangeLogItem>) -> Self {
        Error::Changes {
            changes,
            source: Box::new(self),
        }
    }
}
