//! Database builder for fluent configuration

use std::sync::Arc;

use quarry_core::Result;

use super::Database;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::driver::Connector;
use crate::retry::{Clock, SystemClock};

// ============================================================================
// Database Builder Pattern
// ============================================================================

/// Builder for a [`Database`]
///
/// ```ignore
/// use quarry_engine::{Database, EngineConfig};
///
/// // 1. Defaults
/// let db = Database::new(connector, "Server=db;Database=shop")?;
///
/// // 2. Configuration from a file
/// let db = Database::builder(connector, "Server=db;Database=shop")
///     .config(EngineConfig::load(Path::new("quarry.toml"))?)
///     .build()?;
///
/// // 3. Tests: no real sleeps between attempts
/// let clock = Arc::new(ManualClock::new());
/// let db = Database::builder(connector, "test")
///     .clock(clock.clone())
///     .build()?;
/// ```
pub struct DatabaseBuilder {
    connector: Arc<dyn Connector>,
    connection_string: String,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl DatabaseBuilder {
    pub(crate) fn new(connector: Arc<dyn Connector>, connection_string: String) -> Self {
        Self {
            connector,
            connection_string,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use this configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this clock for retry pacing
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a ceiling or batch size is zero.
    pub fn build(self) -> Result<Database> {
        self.config.validate()?;
        Ok(Database::from_context(EngineContext {
            connector: self.connector,
            connection_string: self.connection_string,
            config: self.config,
            clock: self.clock,
        }))
    }
}
