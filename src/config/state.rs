// Application state module
// Immutable per-process state shared by every connection

use super::types::Config;
use crate::error::ConfigError;
use crate::handler::Dispatcher;

/// Application state
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub dispatcher: Dispatcher,

    // Cached so the hot path does not walk the config
    pub access_log: bool,
}

impl AppState {
    /// Validate the config and build the dispatcher from it
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let dispatcher = Dispatcher::from_config(&config)?;
        let access_log = config.logging.access_log;

        Ok(Self {
            config,
            dispatcher,
            access_log,
        })
    }
}
