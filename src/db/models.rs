//! Domain models for the export sales schema.
//!
//! These are the storage-agnostic record types passed between the repository
//! layer and the services. Reference data (commodities, countries, units,
//! regions) is populated by the collector's metadata refresh; the export fact
//! table is written by the collector and read by the analyzer and reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{CommodityCode, CountryCode, MarketYear, Metric};

/// Commodity reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub code: CommodityCode,
    pub name: String,
    pub unit_id: i32,
}

/// Country reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: CountryCode,
    pub name: String,
    pub description: Option<String>,
    pub region_id: Option<i32>,
}

/// Unit-of-measure reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub unit_id: i32,
    pub name: String,
}

/// Region reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: i32,
    pub name: String,
}

/// Commodity metadata joined with its unit of measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityInfo {
    pub commodity_code: CommodityCode,
    pub commodity_name: String,
    pub unit_id: i32,
    pub unit_name: String,
}

/// One week of export activity for a (commodity, country, marketing year).
///
/// Identity is the composite (commodity, country, market_year, week_ending);
/// upserts are last-write-wins on that key. The `next_my_*` fields carry the
/// upstream's next-marketing-year columns, which the analyzer splits out into
/// rows of `market_year + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub commodity: CommodityCode,
    pub country: CountryCode,
    pub market_year: MarketYear,
    pub week_ending: NaiveDate,
    pub weekly_exports: f64,
    pub accumulated_exports: f64,
    pub outstanding_sales: f64,
    pub gross_new_sales: f64,
    pub net_sales: f64,
    pub total_commitments: f64,
    pub next_my_net_sales: Option<f64>,
    pub next_my_outstanding_sales: Option<f64>,
}

impl ExportRecord {
    /// Composite identity used as the upsert conflict key.
    pub fn key(&self) -> (CommodityCode, CountryCode, MarketYear, NaiveDate) {
        (self.commodity, self.country, self.market_year, self.week_ending)
    }
}

/// Upstream release bookkeeping for one (commodity, marketing year).
///
/// `release_timestamp` is the upstream's opaque publication stamp, compared
/// lexicographically to decide whether a refresh is needed. The marketing-year
/// start/end dates drive the weeks-into-marketing-year axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRelease {
    pub commodity: CommodityCode,
    pub market_year: MarketYear,
    pub release_timestamp: String,
    pub recorded_at: DateTime<Utc>,
    pub market_year_start: NaiveDate,
    pub market_year_end: NaiveDate,
}

/// Export record joined with its country display name, as returned by
/// series queries (ordered by country name, then week ascending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSeriesRow {
    pub record: ExportRecord,
    pub country_name: String,
}

/// Per-country total used by the countries-with-data listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryActivity {
    pub country: CountryCode,
    pub country_name: String,
    pub total_weekly_exports: f64,
}

impl ExportRecord {
    /// Current-marketing-year value of a metric.
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::WeeklyExports => self.weekly_exports,
            Metric::AccumulatedExports => self.accumulated_exports,
            Metric::OutstandingSales => self.outstanding_sales,
            Metric::GrossNewSales => self.gross_new_sales,
            Metric::NetSales => self.net_sales,
            Metric::TotalCommitments => self.total_commitments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ExportRecord {
        ExportRecord {
            commodity: CommodityCode(101),
            country: CountryCode(5700),
            market_year: MarketYear(2023),
            week_ending: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            weekly_exports: 100.0,
            accumulated_exports: 1500.0,
            outstanding_sales: 300.0,
            gross_new_sales: 120.0,
            net_sales: 110.0,
            total_commitments: 1800.0,
            next_my_net_sales: None,
            next_my_outstanding_sales: None,
        }
    }

    #[test]
    fn test_record_key() {
        let r = record();
        assert_eq!(
            r.key(),
            (
                CommodityCode(101),
                CountryCode(5700),
                MarketYear(2023),
                NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
            )
        );
    }

    #[test]
    fn test_metric_accessor() {
        let r = record();
        assert_eq!(r.metric(Metric::WeeklyExports), 100.0);
        assert_eq!(r.metric(Metric::TotalCommitments), 1800.0);
    }
}
