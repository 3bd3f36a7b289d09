//! Database module for export sales data storage.
//!
//! This module provides abstractions for database operations via the
//! Repository pattern, allowing different storage backends to be swapped
//! easily.
//!
//! # Architecture
//!
//! The database module follows a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application Layer (REST API, collector binary)          │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services/) - Business Logic              │
//! │  - Series loading and reshaping                          │
//! │  - Summary statistics, plots, reports                    │
//! │  - Collection orchestration                              │
//! └───────────────────┬─────────────────────────────────────┘
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface    │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │                                │
//! ┌───▼──────────────┐     ┌──────────▼──────────────┐
//! │ Sqlite Repository│     │ Local Repository        │
//! │ (Diesel)         │     │ (in-memory)             │
//! └──────────────────┘     └─────────────────────────┘
//! ```

#[cfg(not(any(feature = "sqlite-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod models;
pub mod repo_config;
pub mod repositories;
pub mod repository;

// Sqlite config is colocated with the repository implementation.
#[cfg(feature = "sqlite-repo")]
pub use repositories::sqlite::SqliteConfig;
#[cfg(not(feature = "sqlite-repo"))]
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    _private: (),
}

pub use repo_config::AppConfig;

// Repository trait and implementations
pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "sqlite-repo")]
pub use repositories::SqliteRepository;
pub use repository::{
    ErrorContext, ExportRepository, FullRepository, ReferenceRepository, ReleaseRepository,
    RepositoryError, RepositoryResult,
};
