//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for development, should be restricted in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Endpoints shared by every registered data module
    let module_api = Router::new()
        .route("/commodities", get(handlers::list_commodities))
        .route("/get_years", post(handlers::get_years))
        .route("/get_countries", post(handlers::get_countries))
        .route("/get_plot", post(handlers::get_plot))
        .route("/generate_report", post(handlers::generate_report));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/modules", get(handlers::list_modules))
        .nest("/modules/{module}", module_api)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::modules::{ExportSalesModule, ModuleRegistry};
    use std::sync::Arc;

    #[test]
    fn test_router_creation() {
        let repo = Arc::new(LocalRepository::new());
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(ExportSalesModule::new(repo.clone())));
        let state = AppState::new(Arc::new(registry), repo);
        let _router = create_router(state);
        // If we got here, router was created successfully
    }
}
