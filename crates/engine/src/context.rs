//! State shared by every command created from one `Database`

use crate::config::EngineConfig;
use crate::driver::Connector;
use crate::retry::Clock;
use std::sync::Arc;

pub(crate) struct EngineContext {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) connection_string: String,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
}
