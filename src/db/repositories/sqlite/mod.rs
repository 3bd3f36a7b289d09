//! SQLite repository implementation using Diesel.
//!
//! This module implements the repository traits against a SQLite database,
//! one database file per data module.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures (locked database)
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! Environment variables:
//! - `ESR_DATABASE_PATH`: Path to the SQLite database file (required)
//! - `ESR_POOL_MAX`: Maximum pool size (default: 10)
//! - `ESR_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `ESR_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `ESR_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task;

use crate::api::{CommodityCode, CountryCode, MarketYear};
use crate::db::models::{
    Commodity, CommodityInfo, Country, CountryActivity, DataRelease, ExportRecord,
    ExportSeriesRow, Region, UnitOfMeasure,
};
use crate::db::repository::{
    ErrorContext, ExportRepository, ReferenceRepository, ReleaseRepository, RepositoryError,
    RepositoryResult,
};

mod models;
mod schema;

use models::*;
use schema::*;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/sqlite/migrations");

/// Configuration for the SQLite backend.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file
    pub database_path: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            max_pool_size: 10,
            connection_timeout_sec: 30,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl SqliteConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_path = std::env::var("ESR_DATABASE_PATH")
            .map_err(|_| "ESR_DATABASE_PATH must be set".to_string())?;

        let max_pool_size = std::env::var("ESR_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let connection_timeout_sec = std::env::var("ESR_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let max_retries = std::env::var("ESR_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        let retry_delay_ms = std::env::var("ESR_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(100);

        Ok(Self {
            database_path,
            max_pool_size,
            connection_timeout_sec,
            max_retries,
            retry_delay_ms,
        })
    }

    /// Create a new configuration with a database path.
    pub fn with_path(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }
}

/// Applies SQLite pragmas on every pooled connection.
#[derive(Debug)]
struct SqlitePragmas;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Diesel-backed repository for SQLite.
///
/// Provides connection pooling, automatic retry for transient failures
/// (locked database), and automatic schema migrations.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    config: SqliteConfig,
}

impl SqliteRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// * `Ok(SqliteRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: SqliteConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(&config.database_path);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .connection_customizer(Box::new(SqlitePragmas))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("path={}", config.database_path)),
                )
            })?;

        // Run migrations once during initialization
        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self { pool, config })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut SqliteConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient
    /// failures (locked database, pool exhaustion).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2; // Exponential backoff
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

fn record_from_row(row: ExportRecordRow) -> ExportRecord {
    ExportRecord {
        commodity: CommodityCode(row.commodity_code),
        country: CountryCode(row.country_code),
        market_year: MarketYear(row.market_year),
        week_ending: row.week_ending_date,
        weekly_exports: row.weekly_exports,
        accumulated_exports: row.accumulated_exports,
        outstanding_sales: row.outstanding_sales,
        gross_new_sales: row.gross_new_sales,
        net_sales: row.net_sales,
        total_commitments: row.total_commitments,
        next_my_net_sales: row.next_my_net_sales,
        next_my_outstanding_sales: row.next_my_outstanding_sales,
    }
}

fn row_from_record(record: &ExportRecord, now: chrono::NaiveDateTime) -> NewExportRecordRow {
    NewExportRecordRow {
        commodity_code: record.commodity.value(),
        country_code: record.country.value(),
        market_year: record.market_year.value(),
        week_ending_date: record.week_ending,
        weekly_exports: record.weekly_exports,
        accumulated_exports: record.accumulated_exports,
        outstanding_sales: record.outstanding_sales,
        gross_new_sales: record.gross_new_sales,
        net_sales: record.net_sales,
        total_commitments: record.total_commitments,
        next_my_net_sales: record.next_my_net_sales,
        next_my_outstanding_sales: record.next_my_outstanding_sales,
        updated_at: now,
    }
}

fn release_from_row(row: DataReleaseRow) -> DataRelease {
    DataRelease {
        commodity: CommodityCode(row.commodity_code),
        market_year: MarketYear(row.market_year),
        release_timestamp: row.release_timestamp,
        recorded_at: DateTime::<Utc>::from_naive_utc_and_offset(row.recorded_at, Utc),
        market_year_start: row.market_year_start,
        market_year_end: row.market_year_end,
    }
}

#[async_trait]
impl ReferenceRepository for SqliteRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn list_commodities(&self) -> RepositoryResult<Vec<Commodity>> {
        self.with_conn(|conn| {
            let rows = commodities::table
                .order(commodities::commodity_name.asc())
                .select(CommodityRow::as_select())
                .load::<CommodityRow>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows
                .into_iter()
                .map(|r| Commodity {
                    code: CommodityCode(r.commodity_code),
                    name: r.commodity_name,
                    unit_id: r.unit_id,
                })
                .collect())
        })
        .await
    }

    async fn get_commodity_info(
        &self,
        commodity: CommodityCode,
    ) -> RepositoryResult<CommodityInfo> {
        let code = commodity.value();
        self.with_conn(move |conn| {
            let (row, unit_name) = commodities::table
                .inner_join(units_of_measure::table)
                .filter(commodities::commodity_code.eq(code))
                .select((CommodityRow::as_select(), units_of_measure::unit_name))
                .first::<(CommodityRow, String)>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .ok_or_else(|| {
                    RepositoryError::not_found_with_context(
                        format!("No commodity found with code {}", code),
                        ErrorContext::new("get_commodity_info")
                            .with_entity("commodity")
                            .with_entity_id(code),
                    )
                })?;

            Ok(CommodityInfo {
                commodity_code: CommodityCode(row.commodity_code),
                commodity_name: row.commodity_name,
                unit_id: row.unit_id,
                unit_name,
            })
        })
        .await
    }

    async fn list_countries(&self) -> RepositoryResult<Vec<Country>> {
        self.with_conn(|conn| {
            let rows = countries::table
                .order(countries::country_name.asc())
                .select(CountryRow::as_select())
                .load::<CountryRow>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows
                .into_iter()
                .map(|r| Country {
                    code: CountryCode(r.country_code),
                    name: r.country_name,
                    description: r.country_description,
                    region_id: r.region_id,
                })
                .collect())
        })
        .await
    }

    async fn list_regions(&self) -> RepositoryResult<Vec<Region>> {
        self.with_conn(|conn| {
            let rows = regions::table
                .order(regions::region_name.asc())
                .select(RegionRow::as_select())
                .load::<RegionRow>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows
                .into_iter()
                .map(|r| Region {
                    region_id: r.region_id,
                    name: r.region_name,
                })
                .collect())
        })
        .await
    }

    async fn replace_reference_data(
        &self,
        commodities_in: Vec<Commodity>,
        countries_in: Vec<Country>,
        units_in: Vec<UnitOfMeasure>,
        regions_in: Vec<Region>,
    ) -> RepositoryResult<()> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(commodities::table).execute(tx)?;
                diesel::delete(countries::table).execute(tx)?;
                diesel::delete(units_of_measure::table).execute(tx)?;
                diesel::delete(regions::table).execute(tx)?;

                let commodity_rows: Vec<CommodityRow> = commodities_in
                    .iter()
                    .map(|c| CommodityRow {
                        commodity_code: c.code.value(),
                        commodity_name: c.name.clone(),
                        unit_id: c.unit_id,
                    })
                    .collect();
                diesel::insert_into(commodities::table)
                    .values(&commodity_rows)
                    .execute(tx)?;

                let country_rows: Vec<CountryRow> = countries_in
                    .iter()
                    .map(|c| CountryRow {
                        country_code: c.code.value(),
                        country_name: c.name.clone(),
                        country_description: c.description.clone(),
                        region_id: c.region_id,
                    })
                    .collect();
                diesel::insert_into(countries::table)
                    .values(&country_rows)
                    .execute(tx)?;

                let unit_rows: Vec<UnitRow> = units_in
                    .iter()
                    .map(|u| UnitRow {
                        unit_id: u.unit_id,
                        unit_name: u.name.clone(),
                    })
                    .collect();
                diesel::insert_into(units_of_measure::table)
                    .values(&unit_rows)
                    .execute(tx)?;

                let region_rows: Vec<RegionRow> = regions_in
                    .iter()
                    .map(|r| RegionRow {
                        region_id: r.region_id,
                        region_name: r.name.clone(),
                    })
                    .collect();
                diesel::insert_into(regions::table)
                    .values(&region_rows)
                    .execute(tx)?;

                Ok(())
            })
            .map_err(map_diesel_error)
        })
        .await
    }
}

#[async_trait]
impl ExportRepository for SqliteRepository {
    async fn fetch_series(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<ExportSeriesRow>> {
        let (code, start, end) = (commodity.value(), start_year.value(), end_year.value());
        self.with_conn(move |conn| {
            let rows = export_records::table
                .inner_join(countries::table)
                .filter(export_records::commodity_code.eq(code))
                .filter(export_records::market_year.between(start, end))
                .order((
                    countries::country_name.asc(),
                    export_records::week_ending_date.asc(),
                ))
                .select((ExportRecordRow::as_select(), countries::country_name))
                .load::<(ExportRecordRow, String)>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows
                .into_iter()
                .map(|(row, country_name)| ExportSeriesRow {
                    record: record_from_row(row),
                    country_name,
                })
                .collect())
        })
        .await
    }

    async fn fetch_records_for_week(
        &self,
        commodity: CommodityCode,
        week_ending: NaiveDate,
    ) -> RepositoryResult<Vec<ExportSeriesRow>> {
        let code = commodity.value();
        self.with_conn(move |conn| {
            let rows = export_records::table
                .inner_join(countries::table)
                .filter(export_records::commodity_code.eq(code))
                .filter(export_records::week_ending_date.eq(week_ending))
                .order(countries::country_name.asc())
                .select((ExportRecordRow::as_select(), countries::country_name))
                .load::<(ExportRecordRow, String)>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows
                .into_iter()
                .map(|(row, country_name)| ExportSeriesRow {
                    record: record_from_row(row),
                    country_name,
                })
                .collect())
        })
        .await
    }

    async fn latest_weeks(
        &self,
        commodity: CommodityCode,
        n: usize,
    ) -> RepositoryResult<Vec<NaiveDate>> {
        let code = commodity.value();
        self.with_conn(move |conn| {
            export_records::table
                .filter(export_records::commodity_code.eq(code))
                .select(export_records::week_ending_date)
                .distinct()
                .order(export_records::week_ending_date.desc())
                .limit(n as i64)
                .load::<NaiveDate>(conn)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn countries_with_data(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<CountryActivity>> {
        let (code, start, end) = (commodity.value(), start_year.value(), end_year.value());
        self.with_conn(move |conn| {
            let rows = export_records::table
                .inner_join(countries::table)
                .filter(export_records::commodity_code.eq(code))
                .filter(export_records::market_year.between(start, end))
                .select((
                    countries::country_code,
                    countries::country_name,
                    export_records::weekly_exports,
                ))
                .load::<(i32, String, f64)>(conn)
                .map_err(map_diesel_error)?;

            let mut totals: BTreeMap<i32, (String, f64)> = BTreeMap::new();
            for (country_code, name, weekly) in rows {
                let entry = totals.entry(country_code).or_insert((name, 0.0));
                entry.1 += weekly;
            }

            let mut activity: Vec<CountryActivity> = totals
                .into_iter()
                .map(|(country_code, (name, total))| CountryActivity {
                    country: CountryCode(country_code),
                    country_name: name,
                    total_weekly_exports: total,
                })
                .collect();
            activity.sort_by(|a, b| a.country_name.cmp(&b.country_name));
            Ok(activity)
        })
        .await
    }

    async fn apply_release_batch(
        &self,
        release: DataRelease,
        records: Vec<ExportRecord>,
    ) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let now = Utc::now().naive_utc();
                let count = records.len();

                for record in &records {
                    let row = row_from_record(record, now);
                    diesel::insert_into(export_records::table)
                        .values(&row)
                        .on_conflict((
                            export_records::commodity_code,
                            export_records::country_code,
                            export_records::market_year,
                            export_records::week_ending_date,
                        ))
                        .do_update()
                        .set(&row)
                        .execute(tx)?;
                }

                let release_row = DataReleaseRow {
                    commodity_code: release.commodity.value(),
                    market_year: release.market_year.value(),
                    release_timestamp: release.release_timestamp.clone(),
                    recorded_at: release.recorded_at.naive_utc(),
                    market_year_start: release.market_year_start,
                    market_year_end: release.market_year_end,
                };
                diesel::insert_into(data_releases::table)
                    .values(&release_row)
                    .on_conflict((data_releases::commodity_code, data_releases::market_year))
                    .do_update()
                    .set(&release_row)
                    .execute(tx)?;

                Ok(count)
            })
            .map_err(|e| map_diesel_error(e).with_operation("apply_release_batch"))
        })
        .await
    }
}

#[async_trait]
impl ReleaseRepository for SqliteRepository {
    async fn get_releases(&self, commodity: CommodityCode) -> RepositoryResult<Vec<DataRelease>> {
        let code = commodity.value();
        self.with_conn(move |conn| {
            let rows = data_releases::table
                .filter(data_releases::commodity_code.eq(code))
                .order(data_releases::market_year.asc())
                .select(DataReleaseRow::as_select())
                .load::<DataReleaseRow>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows.into_iter().map(release_from_row).collect())
        })
        .await
    }

    async fn all_releases(&self) -> RepositoryResult<Vec<DataRelease>> {
        self.with_conn(|conn| {
            let rows = data_releases::table
                .order((
                    data_releases::commodity_code.asc(),
                    data_releases::market_year.asc(),
                ))
                .select(DataReleaseRow::as_select())
                .load::<DataReleaseRow>(conn)
                .map_err(map_diesel_error)?;

            Ok(rows.into_iter().map(release_from_row).collect())
        })
        .await
    }
}
