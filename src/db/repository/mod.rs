//! Repository traits for abstracting database operations.
//!
//! These traits define the interface for all database operations, allowing
//! different implementations (SQLite via Diesel, in-memory) to be swapped
//! via dependency injection.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::models::{
    Commodity, CommodityInfo, Country, CountryActivity, DataRelease, ExportRecord,
    ExportSeriesRow, Region, UnitOfMeasure,
};
use crate::api::{CommodityCode, MarketYear};

pub mod error;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Repository operations on the static reference tables.
///
/// Reference data is replaced wholesale by the collector's metadata refresh
/// and read by the services when resolving codes to display names.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust and allow
/// sharing across threads.
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// Check if the database connection is healthy.
    ///
    /// # Returns
    /// - `Ok(true)` if connection is healthy
    /// - `Ok(false)` if connection is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if an error occurred during the check
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// List all commodities, sorted by display name.
    async fn list_commodities(&self) -> RepositoryResult<Vec<Commodity>>;

    /// Get commodity metadata joined with its unit of measure.
    ///
    /// # Returns
    /// * `Ok(CommodityInfo)` - Metadata for the commodity
    /// * `Err(RepositoryError::NotFound)` - If the commodity code is unknown
    async fn get_commodity_info(&self, commodity: CommodityCode)
        -> RepositoryResult<CommodityInfo>;

    /// List all countries, sorted by display name.
    async fn list_countries(&self) -> RepositoryResult<Vec<Country>>;

    /// List all regions, sorted by display name.
    async fn list_regions(&self) -> RepositoryResult<Vec<Region>>;

    /// Replace the reference tables with a fresh snapshot from upstream.
    ///
    /// The previous contents are discarded; the replacement is atomic.
    async fn replace_reference_data(
        &self,
        commodities: Vec<Commodity>,
        countries: Vec<Country>,
        units: Vec<UnitOfMeasure>,
        regions: Vec<Region>,
    ) -> RepositoryResult<()>;
}

/// Repository operations on the export fact table.
#[async_trait]
pub trait ExportRepository: Send + Sync {
    /// Fetch export records for a commodity over an inclusive marketing-year
    /// range, joined with country names.
    ///
    /// # Returns
    /// * `Ok(Vec<ExportSeriesRow>)` - Matching rows ordered by country name,
    ///   then week-ending date ascending. Empty when no rows match.
    async fn fetch_series(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<ExportSeriesRow>>;

    /// Fetch export records for a commodity at a single week-ending date.
    async fn fetch_records_for_week(
        &self,
        commodity: CommodityCode,
        week_ending: NaiveDate,
    ) -> RepositoryResult<Vec<ExportSeriesRow>>;

    /// The `n` most recent distinct week-ending dates for a commodity,
    /// newest first.
    async fn latest_weeks(
        &self,
        commodity: CommodityCode,
        n: usize,
    ) -> RepositoryResult<Vec<NaiveDate>>;

    /// Countries with at least one record for the commodity in the range,
    /// sorted by display name. Each entry carries its total weekly exports
    /// over the range.
    async fn countries_with_data(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<CountryActivity>>;

    /// Apply one collector batch: upsert all records for a (commodity,
    /// marketing year) and record the release row, atomically.
    ///
    /// The conflict key is (commodity, country, market_year, week_ending);
    /// re-fetched rows are last-write-wins. A failure leaves the previous
    /// state untouched.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of records upserted
    async fn apply_release_batch(
        &self,
        release: DataRelease,
        records: Vec<ExportRecord>,
    ) -> RepositoryResult<usize>;
}

/// Repository operations on the release-tracking table.
#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Release rows for a commodity, ordered by marketing year ascending.
    async fn get_releases(&self, commodity: CommodityCode) -> RepositoryResult<Vec<DataRelease>>;

    /// All release rows, for the collector's refresh diffing.
    async fn all_releases(&self) -> RepositoryResult<Vec<DataRelease>>;
}

/// Combined repository interface used throughout the application.
pub trait FullRepository: ReferenceRepository + ExportRepository + ReleaseRepository {}

impl<T> FullRepository for T where T: ReferenceRepository + ExportRepository + ReleaseRepository {}
