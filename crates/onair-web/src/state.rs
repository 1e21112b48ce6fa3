//! Application state.

use onair_core::{Registry, RegistryConfig};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_registry(Arc::new(Registry::with_config(config)))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
