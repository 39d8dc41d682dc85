//! Shared application state injected into every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::upstream::Upstream;

/// Read-only after startup; requests share nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    pub fn new(config: Config, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}
