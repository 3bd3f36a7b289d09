//! Application state for the HTTP server.

use std::sync::Arc;

use crate::db::repository::FullRepository;
use crate::modules::ModuleRegistry;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry of data modules, selected by URL path segment
    pub registry: Arc<ModuleRegistry>,
    /// Repository backing the health endpoint
    pub repository: Arc<dyn FullRepository>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(registry: Arc<ModuleRegistry>, repository: Arc<dyn FullRepository>) -> Self {
        Self {
            registry,
            repository,
        }
    }
}
