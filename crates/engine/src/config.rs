//! Engine configuration via TOML
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Defaults match the SQL Server limits the engine was tuned against.

use quarry_core::{Error, Limits, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Engine configuration.
///
/// # Example
///
/// ```toml
/// bulk_threshold = 1000
/// retry_count = 2
/// retry_interval_ms = 1000
/// log_changes = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pending changes at or above which full-row changes are bulk loaded
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,
    /// Row cap of a multi-row INSERT
    #[serde(default = "default_insert_batch_rows")]
    pub insert_batch_rows: usize,
    /// Parameter ceiling per statement and per round trip
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
    /// Statements concatenated into one round trip
    #[serde(default = "default_statements_per_round")]
    pub statements_per_round: usize,
    /// Attempts per execution when retrying is enabled
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    /// Pause between attempts, in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Wall-clock bound on retrying, in milliseconds
    #[serde(default = "default_retry_ceiling_ms")]
    pub retry_ceiling_ms: u64,
    /// Timeout for selects and raw SQL; driver default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Timeout for mutation round trips
    #[serde(default = "default_mutation_timeout_secs")]
    pub mutation_timeout_secs: u64,
    /// Timeout for existence probes and the lock report
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Timeout for COUNT and EXISTS
    #[serde(default = "default_quick_timeout_secs")]
    pub quick_timeout_secs: u64,
    /// Timeout for driver bulk copies
    #[serde(default = "default_bulk_copy_timeout_secs")]
    pub bulk_copy_timeout_secs: u64,
    /// Rows per bulk copy batch
    #[serde(default = "default_bulk_batch_rows")]
    pub bulk_batch_rows: usize,
    /// Rows per bulk copy batch for wide rows
    #[serde(default = "default_bulk_wide_batch_rows")]
    pub bulk_wide_batch_rows: usize,
    /// Column count above which a row is wide
    #[serde(default = "default_bulk_wide_columns")]
    pub bulk_wide_columns: usize,
    /// Upper bound on declared string parameter size
    #[serde(default = "default_string_param_max")]
    pub string_param_max: usize,
    /// Log every pending change at debug level before saving
    #[serde(default)]
    pub log_changes: bool,
    /// Spawn a blocking-session report on the first lock timeout
    #[serde(default = "default_true")]
    pub lock_diagnostics: bool,
}

fn default_bulk_threshold() -> usize {
    1000
}
fn default_insert_batch_rows() -> usize {
    20
}
fn default_max_parameters() -> usize {
    2000
}
fn default_statements_per_round() -> usize {
    10
}
fn default_retry_count() -> usize {
    2
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_retry_ceiling_ms() -> u64 {
    40_000
}
fn default_mutation_timeout_secs() -> u64 {
    60
}
fn default_probe_timeout_secs() -> u64 {
    3
}
fn default_quick_timeout_secs() -> u64 {
    10
}
fn default_bulk_copy_timeout_secs() -> u64 {
    120
}
fn default_bulk_batch_rows() -> usize {
    10_000
}
fn default_bulk_wide_batch_rows() -> usize {
    5_000
}
fn default_bulk_wide_columns() -> usize {
    64
}
fn default_string_param_max() -> usize {
    6000
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bulk_threshold: default_bulk_threshold(),
            insert_batch_rows: default_insert_batch_rows(),
            max_parameters: default_max_parameters(),
            statements_per_round: default_statements_per_round(),
            retry_count: default_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_ceiling_ms: default_retry_ceiling_ms(),
            command_timeout_secs: None,
            mutation_timeout_secs: default_mutation_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            quick_timeout_secs: default_quick_timeout_secs(),
            bulk_copy_timeout_secs: default_bulk_copy_timeout_secs(),
            bulk_batch_rows: default_bulk_batch_rows(),
            bulk_wide_batch_rows: default_bulk_wide_batch_rows(),
            bulk_wide_columns: default_bulk_wide_columns(),
            string_param_max: default_string_param_max(),
            log_changes: false,
            lock_diagnostics: true,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text and validate.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize engine config: {}", e)))
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("insert_batch_rows", self.insert_batch_rows),
            ("max_parameters", self.max_parameters),
            ("statements_per_round", self.statements_per_round),
            ("bulk_batch_rows", self.bulk_batch_rows),
            ("bulk_wide_batch_rows", self.bulk_wide_batch_rows),
            ("string_param_max", self.string_param_max),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.retry_ceiling_ms == 0 {
            return Err(Error::Config(
                "retry_ceiling_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Statement synthesis limits
    pub fn limits(&self) -> Limits {
        Limits {
            max_parameters: self.max_parameters,
            insert_batch_rows: self.insert_batch_rows,
            statements_per_round: self.statements_per_round,
            string_param_max: self.string_param_max,
        }
    }

    /// Retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_retry_count(self.retry_count)
            .with_interval_ms(self.retry_interval_ms)
            .with_ceiling_ms(self.retry_ceiling_ms)
    }

    /// Timeout for selects and raw SQL
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Timeout for mutation round trips
    pub fn mutation_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.mutation_timeout_secs))
    }

    /// Timeout for existence probes
    pub fn probe_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.probe_timeout_secs))
    }

    /// Timeout for COUNT and EXISTS
    pub fn quick_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.quick_timeout_secs))
    }

    /// Timeout for bulk copies
    pub fn bulk_copy_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.bulk_copy_timeout_secs))
    }

    /// Bulk copy batch size for rows of `columns` columns
    pub fn bulk_batch_size(&self, columns: usize) -> usize {
        if columns > self.bulk_wide_columns {
            self.bulk_wide_batch_rows
        } else {
            self.bulk_batch_rows
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.bulk_threshold, 1000);
        assert_eq!(config.retry_ceiling_ms, 40_000);
        assert!(config.lock_diagnostics);
        assert!(!config.log_changes);
    }

    #[test]
    fn test_partial_document_overrides() {
        let config =
            EngineConfig::from_toml_str("retry_count = 5\ncommand_timeout_secs = 30\n").unwrap();
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.insert_batch_rows, 20);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let err = EngineConfig::from_toml_str("max_parameters = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("max_parameters"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(EngineConfig::from_toml_str("retry_count = \"many\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bulk_threshold = 50").unwrap();
        writeln!(file, "log_changes = true").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.bulk_threshold, 50);
        assert!(config.log_changes);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/quarry.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_round_trip_preserves_values() {
        let config = EngineConfig {
            retry_count: 4,
            ..EngineConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_wide_rows_use_smaller_batches() {
        let config = EngineConfig::default();
        assert_eq!(config.bulk_batch_size(10), 10_000);
        assert_eq!(config.bulk_batch_size(64), 10_000);
        assert_eq!(config.bulk_batch_size(65), 5_000);
    }

    #[test]
    fn test_limits_follow_config() {
        let config = EngineConfig {
            max_parameters: 100,
            ..EngineConfig::default()
        };
        assert_eq!(config.limits().max_parameters, 100);
        assert_eq!(config.limits().insert_batch_rows, 20);
    }
}
