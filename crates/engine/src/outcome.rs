//! Command outcomes
//!
//! `execute` never returns `Err`. Every failure is captured in an
//! [`Outcome`], which always carries its cause.

use quarry_core::{Error, Result};
use serde::Serialize;
use tracing::error;

/// Result of one top-level execution
#[derive(Debug, Clone)]
#[must_use = "an Outcome may carry a failure"]
pub struct Outcome<T> {
    value: Option<T>,
    error: Option<Error>,
}

impl<T> Outcome<T> {
    /// Successful outcome
    pub fn success(value: T) -> Self {
        Outcome {
            value: Some(value),
            error: None,
        }
    }

    /// Failed outcome
    pub fn failure(error: Error) -> Self {
        Outcome {
            value: None,
            error: Some(error),
        }
    }

    /// Capture a result, logging a failure once under `command`.
    pub(crate) fn capture(command: &'static str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => {
                error!(target: "quarry::engine", command, kind = ?e.kind(), error = %e, "Command failed");
                Self::failure(e)
            }
        }
    }

    /// Whether the execution succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Failure cause, if any
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Value, on success
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Convert into a standard `Result`
    pub fn into_result(self) -> Result<T> {
        match (self.value, self.error) {
            (_, Some(e)) => Err(e),
            (Some(v), None) => Ok(v),
            (None, None) => Err(Error::Internal("outcome without value".to_string())),
        }
    }

    /// Transform the success value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: self.value.map(f),
            error: self.error,
        }
    }
}

/// Row counts reported by change commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    /// Changes applied as inserts
    pub inserted: usize,
    /// Changes applied as updates
    pub updated: usize,
    /// Changes applied as deletes
    pub deleted: usize,
    /// Rows the server reported affected by statement-based execution
    pub affected: u64,
    /// Rows staged through the bulk path
    pub bulk_staged: usize,
}

impl ChangeCounts {
    /// Changes applied in total
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}
