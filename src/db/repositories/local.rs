//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! memory using ordered maps, providing fast, deterministic, and isolated
//! execution.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::api::{CommodityCode, CountryCode, MarketYear};
use crate::db::models::{
    Commodity, CommodityInfo, Country, CountryActivity, DataRelease, ExportRecord,
    ExportSeriesRow, Region, UnitOfMeasure,
};
use crate::db::repository::{
    ExportRepository, ReferenceRepository, ReleaseRepository, RepositoryError, RepositoryResult,
};

/// In-memory local repository.
///
/// Stores all data in ordered maps, making it ideal for unit tests and local
/// development that need isolation and speed. The `seed_*` helpers populate
/// state directly without going through the collector.
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Default)]
struct LocalData {
    commodities: BTreeMap<i32, Commodity>,
    countries: BTreeMap<i32, Country>,
    units: BTreeMap<i32, UnitOfMeasure>,
    regions: BTreeMap<i32, Region>,

    // Fact table, keyed by the composite identity. BTreeMap keeps iteration
    // deterministic across runs.
    exports: BTreeMap<(i32, i32, i32, NaiveDate), ExportRecord>,

    // Release bookkeeping keyed by (commodity, marketing year).
    releases: BTreeMap<(i32, i32), DataRelease>,

    // Connection health toggle for testing failure paths.
    is_healthy: bool,
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData {
                is_healthy: true,
                ..Default::default()
            })),
        }
    }

    /// Seed the reference tables directly (test/dev helper).
    pub fn seed_reference(
        &self,
        commodities: Vec<Commodity>,
        countries: Vec<Country>,
        units: Vec<UnitOfMeasure>,
    ) {
        let mut data = self.data.write().unwrap();
        for c in commodities {
            data.commodities.insert(c.code.value(), c);
        }
        for c in countries {
            data.countries.insert(c.code.value(), c);
        }
        for u in units {
            data.units.insert(u.unit_id, u);
        }
    }

    /// Seed export records directly (test/dev helper). Last write wins on
    /// duplicate keys, matching the collector's upsert semantics.
    pub fn seed_records(&self, records: Vec<ExportRecord>) {
        let mut data = self.data.write().unwrap();
        for r in records {
            let (c, co, my, w) = r.key();
            data.exports
                .insert((c.value(), co.value(), my.value(), w), r);
        }
    }

    /// Seed a release row directly (test/dev helper).
    pub fn seed_release(&self, release: DataRelease) {
        let mut data = self.data.write().unwrap();
        data.releases.insert(
            (release.commodity.value(), release.market_year.value()),
            release,
        );
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        let mut data = self.data.write().unwrap();
        data.is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write().unwrap();
        let healthy = data.is_healthy;
        *data = LocalData {
            is_healthy: healthy,
            ..Default::default()
        };
    }

    /// Number of export records stored.
    pub fn record_count(&self) -> usize {
        self.data.read().unwrap().exports.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        let data = self.data.read().unwrap();
        if !data.is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn country_name(data: &LocalData, code: CountryCode) -> String {
    data.countries
        .get(&code.value())
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("Country {}", code.value()))
}

#[async_trait]
impl ReferenceRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        let data = self.data.read().unwrap();
        Ok(data.is_healthy)
    }

    async fn list_commodities(&self) -> RepositoryResult<Vec<Commodity>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut commodities: Vec<Commodity> = data.commodities.values().cloned().collect();
        commodities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(commodities)
    }

    async fn get_commodity_info(
        &self,
        commodity: CommodityCode,
    ) -> RepositoryResult<CommodityInfo> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let row = data.commodities.get(&commodity.value()).ok_or_else(|| {
            RepositoryError::not_found(format!("No commodity found with code {}", commodity))
        })?;
        let unit_name = data
            .units
            .get(&row.unit_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Unknown Unit".to_string());
        Ok(CommodityInfo {
            commodity_code: row.code,
            commodity_name: row.name.clone(),
            unit_id: row.unit_id,
            unit_name,
        })
    }

    async fn list_countries(&self) -> RepositoryResult<Vec<Country>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut countries: Vec<Country> = data.countries.values().cloned().collect();
        countries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(countries)
    }

    async fn list_regions(&self) -> RepositoryResult<Vec<Region>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut regions: Vec<Region> = data.regions.values().cloned().collect();
        regions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(regions)
    }

    async fn replace_reference_data(
        &self,
        commodities: Vec<Commodity>,
        countries: Vec<Country>,
        units: Vec<UnitOfMeasure>,
        regions: Vec<Region>,
    ) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write().unwrap();
        data.commodities = commodities
            .into_iter()
            .map(|c| (c.code.value(), c))
            .collect();
        data.countries = countries.into_iter().map(|c| (c.code.value(), c)).collect();
        data.units = units.into_iter().map(|u| (u.unit_id, u)).collect();
        data.regions = regions.into_iter().map(|r| (r.region_id, r)).collect();
        Ok(())
    }
}

#[async_trait]
impl ExportRepository for LocalRepository {
    async fn fetch_series(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<ExportSeriesRow>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut rows: Vec<ExportSeriesRow> = data
            .exports
            .values()
            .filter(|r| {
                r.commodity == commodity
                    && r.market_year >= start_year
                    && r.market_year <= end_year
            })
            .map(|r| ExportSeriesRow {
                record: r.clone(),
                country_name: country_name(&data, r.country),
            })
            .collect();
        rows.sort_by(|a, b| {
            a.country_name
                .cmp(&b.country_name)
                .then(a.record.week_ending.cmp(&b.record.week_ending))
        });
        Ok(rows)
    }

    async fn fetch_records_for_week(
        &self,
        commodity: CommodityCode,
        week_ending: NaiveDate,
    ) -> RepositoryResult<Vec<ExportSeriesRow>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut rows: Vec<ExportSeriesRow> = data
            .exports
            .values()
            .filter(|r| r.commodity == commodity && r.week_ending == week_ending)
            .map(|r| ExportSeriesRow {
                record: r.clone(),
                country_name: country_name(&data, r.country),
            })
            .collect();
        rows.sort_by(|a, b| a.country_name.cmp(&b.country_name));
        Ok(rows)
    }

    async fn latest_weeks(
        &self,
        commodity: CommodityCode,
        n: usize,
    ) -> RepositoryResult<Vec<NaiveDate>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut weeks: Vec<NaiveDate> = data
            .exports
            .values()
            .filter(|r| r.commodity == commodity)
            .map(|r| r.week_ending)
            .collect();
        weeks.sort();
        weeks.dedup();
        weeks.reverse();
        weeks.truncate(n);
        Ok(weeks)
    }

    async fn countries_with_data(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> RepositoryResult<Vec<CountryActivity>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
        for r in data.exports.values() {
            if r.commodity == commodity && r.market_year >= start_year && r.market_year <= end_year
            {
                *totals.entry(r.country.value()).or_insert(0.0) += r.weekly_exports;
            }
        }
        let mut activity: Vec<CountryActivity> = totals
            .into_iter()
            .map(|(code, total)| CountryActivity {
                country: CountryCode(code),
                country_name: country_name(&data, CountryCode(code)),
                total_weekly_exports: total,
            })
            .collect();
        activity.sort_by(|a, b| a.country_name.cmp(&b.country_name));
        Ok(activity)
    }

    async fn apply_release_batch(
        &self,
        release: DataRelease,
        records: Vec<ExportRecord>,
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        let mut data = self.data.write().unwrap();
        let count = records.len();
        for r in records {
            let (c, co, my, w) = r.key();
            data.exports
                .insert((c.value(), co.value(), my.value(), w), r);
        }
        data.releases.insert(
            (release.commodity.value(), release.market_year.value()),
            release,
        );
        Ok(count)
    }
}

#[async_trait]
impl ReleaseRepository for LocalRepository {
    async fn get_releases(&self, commodity: CommodityCode) -> RepositoryResult<Vec<DataRelease>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        let releases: Vec<DataRelease> = data
            .releases
            .range((commodity.value(), i32::MIN)..=(commodity.value(), i32::MAX))
            .map(|(_, v)| v.clone())
            .collect();
        Ok(releases)
    }

    async fn all_releases(&self) -> RepositoryResult<Vec<DataRelease>> {
        self.check_health()?;
        let data = self.data.read().unwrap();
        Ok(data.releases.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(country: i32, week: NaiveDate, weekly: f64) -> ExportRecord {
        ExportRecord {
            commodity: CommodityCode(101),
            country: CountryCode(country),
            market_year: MarketYear(2023),
            week_ending: week,
            weekly_exports: weekly,
            accumulated_exports: weekly,
            outstanding_sales: 0.0,
            gross_new_sales: 0.0,
            net_sales: 0.0,
            total_commitments: weekly,
            next_my_net_sales: None,
            next_my_outstanding_sales: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_countries(repo: &LocalRepository) {
        repo.seed_reference(
            vec![Commodity {
                code: CommodityCode(101),
                name: "Wheat".to_string(),
                unit_id: 1,
            }],
            vec![
                Country {
                    code: CountryCode(1),
                    name: "Japan".to_string(),
                    description: None,
                    region_id: None,
                },
                Country {
                    code: CountryCode(2),
                    name: "Brazil".to_string(),
                    description: None,
                    region_id: None,
                },
            ],
            vec![UnitOfMeasure {
                unit_id: 1,
                name: "Metric Tons".to_string(),
            }],
        );
    }

    #[tokio::test]
    async fn test_fetch_series_ordering() {
        let repo = LocalRepository::new();
        seed_countries(&repo);
        repo.seed_records(vec![
            record(1, date(2023, 6, 8), 10.0),
            record(1, date(2023, 6, 1), 5.0),
            record(2, date(2023, 6, 1), 20.0),
        ]);

        let rows = repo
            .fetch_series(CommodityCode(101), MarketYear(2023), MarketYear(2023))
            .await
            .unwrap();

        // Ordered by country name (Brazil before Japan), then week ascending.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].country_name, "Brazil");
        assert_eq!(rows[1].country_name, "Japan");
        assert_eq!(rows[1].record.week_ending, date(2023, 6, 1));
        assert_eq!(rows[2].record.week_ending, date(2023, 6, 8));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let repo = LocalRepository::new();
        seed_countries(&repo);
        let release = DataRelease {
            commodity: CommodityCode(101),
            market_year: MarketYear(2023),
            release_timestamp: "2023-06-02T00:00:00".to_string(),
            recorded_at: Utc::now(),
            market_year_start: date(2022, 6, 1),
            market_year_end: date(2023, 5, 31),
        };
        let records = vec![record(1, date(2023, 6, 1), 5.0)];

        repo.apply_release_batch(release.clone(), records.clone())
            .await
            .unwrap();
        let first = repo
            .fetch_series(CommodityCode(101), MarketYear(2023), MarketYear(2023))
            .await
            .unwrap();

        repo.apply_release_batch(release, records).await.unwrap();
        let second = repo
            .fetch_series(CommodityCode(101), MarketYear(2023), MarketYear(2023))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.record_count(), 1);
    }

    #[tokio::test]
    async fn test_countries_with_data_sorted_by_name() {
        let repo = LocalRepository::new();
        seed_countries(&repo);
        repo.seed_records(vec![
            record(1, date(2023, 6, 1), 50.0),
            record(2, date(2023, 6, 1), 20.0),
        ]);

        let activity = repo
            .countries_with_data(CommodityCode(101), MarketYear(2023), MarketYear(2023))
            .await
            .unwrap();

        // Name order, not volume order: Brazil before Japan even though
        // Japan exported more.
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].country_name, "Brazil");
        assert_eq!(activity[0].total_weekly_exports, 20.0);
        assert_eq!(activity[1].country_name, "Japan");
        assert_eq!(activity[1].total_weekly_exports, 50.0);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_errors() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        let err = repo.list_commodities().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_commodity_is_not_found() {
        let repo = LocalRepository::new();
        let err = repo.get_commodity_info(CommodityCode(999)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
