//! Dialect limits for statement synthesis
//!
//! These are the fixed SQL Server constraints the statement builder and the
//! change planner work within. The defaults match what the server accepts;
//! configuration may lower or raise them.

/// Parameter and batching limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum parameters in one statement or round trip (default: 2000)
    pub max_parameters: usize,

    /// Maximum rows in one multi-row INSERT (default: 20)
    pub insert_batch_rows: usize,

    /// Maximum statements concatenated into one round trip (default: 10)
    pub statements_per_round: usize,

    /// Upper bound on declared string parameter size (default: 6000)
    pub string_param_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_parameters: 2000,
            insert_batch_rows: 20,
            statements_per_round: 10,
            string_param_max: 6000,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Lets unit tests reach batching boundaries with a handful of rows.
    pub fn with_small_limits() -> Self {
        Limits {
            max_parameters: 12,
            insert_batch_rows: 3,
            statements_per_round: 2,
            string_param_max: 16,
        }
    }

    /// Rows per multi-row INSERT for a row of `columns` parameters.
    ///
    /// `max(1, min(max_parameters / columns, insert_batch_rows))`. Never zero:
    /// a row wider than the ceiling goes alone and then fails the ceiling
    /// check.
    pub fn rows_per_insert(&self, columns: usize) -> usize {
        let by_params = self.max_parameters / columns.max(1);
        by_params.min(self.insert_batch_rows).max(1)
    }

    /// Declared size of a string parameter whose longest candidate is `len`.
    pub fn string_size(&self, len: usize) -> usize {
        len.min(self.string_param_max).max(1)
    }
}
