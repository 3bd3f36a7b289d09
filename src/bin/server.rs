//! ESR Dashboard HTTP Server Binary
//!
//! This is the main entry point for the dashboard REST API server.
//! It loads configuration, builds the repository and module registry, sets up
//! the HTTP router, and starts serving requests.
//!
//! # Usage
//!
//! ```bash
//! # Run with the in-memory repository (default)
//! cargo run --bin esr-server
//!
//! # Run against a SQLite database
//! ESR_CONFIG=esr.toml cargo run --bin esr-server --features "sqlite-repo,http-server"
//! ```
//!
//! # Environment Variables
//!
//! - `ESR_CONFIG`: Path to esr.toml (default: searched in current/parent dir)
//! - `HOST` / `PORT`: Override the bind address from the config file
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use esr_dashboard::db::{AppConfig, RepositoryFactory, RepositoryType};
use esr_dashboard::http::{create_router, AppState};
use esr_dashboard::modules::{ExportSalesModule, ModuleRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    info!("Starting ESR dashboard server");

    // Configuration is loaded here and passed down explicitly; components
    // never reach for ambient globals.
    let config = match AppConfig::from_default_location() {
        Ok(config) => config,
        Err(e) => {
            warn!("No configuration file loaded ({}); using local repository", e);
            default_local_config()
        }
    };

    let repo_type = config
        .repository_type()
        .map_err(|e| anyhow::anyhow!("Invalid repository type: {}", e))?;
    let sqlite_config = config
        .to_sqlite_config()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let repository = RepositoryFactory::create(repo_type, sqlite_config.as_ref())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!("Repository initialized ({:?})", repo_type);

    // One repository per data module; the registry owns the wiring.
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(ExportSalesModule::new(repository.clone())));

    let state = AppState::new(Arc::new(registry), repository);
    let app = create_router(state);

    // Determine bind address (env overrides the config file)
    let host = env::var("HOST").unwrap_or_else(|_| config.server.host.clone());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn default_local_config() -> AppConfig {
    toml::from_str(
        r#"
[repository]
type = "local"
"#,
    )
    .expect("static default config parses")
}
