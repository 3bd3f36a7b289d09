//! Export series loading and aggregation.
//!
//! Turns raw weekly export records into the time-series shapes consumed by
//! the plot builder and report generator: a loaded series with
//! weeks-into-marketing-year annotations, summary statistics, and
//! groupby/aggregate reshapes keyed by marketing year, week, and country.

use chrono::{Months, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::api::{CommodityCode, CountryCode, MarketYear, Metric, ALL_COUNTRIES};
use crate::db::models::CommodityInfo;
use crate::db::repository::{FullRepository, RepositoryError};

/// Errors surfaced by the analyzer and report generator.
///
/// Everything except internal repository failures is recoverable: the web
/// layer turns recoverable errors into a `{success: false, error}` envelope
/// instead of an HTTP failure.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No commodity found with code {0}")]
    UnknownCommodity(CommodityCode),

    #[error("No data available for commodity {commodity} in marketing years {start}-{end}")]
    NoData {
        commodity: CommodityCode,
        start: MarketYear,
        end: MarketYear,
    },

    #[error("Start marketing year must be <= end marketing year")]
    InvalidYearRange { start: MarketYear, end: MarketYear },

    #[error("Marketing years {missing:?} not found for commodity {commodity}")]
    YearsNotAvailable {
        commodity: CommodityCode,
        missing: Vec<i32>,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AnalysisError {
    /// True when the error should become a structured `{success: false}`
    /// response rather than an HTTP failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AnalysisError::Repository(e) => e.is_not_found(),
            _ => true,
        }
    }
}

/// Marketing-year calendar entry for a commodity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketYearInfo {
    pub year: MarketYear,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One row of the loaded series.
///
/// Measures are optional: rows split out of the upstream's next-marketing-year
/// columns only carry net sales and outstanding sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub country: CountryCode,
    pub country_name: String,
    pub market_year: MarketYear,
    pub week_ending: NaiveDate,
    pub weeks_into_my: Option<i32>,
    pub weekly_exports: Option<f64>,
    pub accumulated_exports: Option<f64>,
    pub outstanding_sales: Option<f64>,
    pub gross_new_sales: Option<f64>,
    pub net_sales: Option<f64>,
    pub total_commitments: Option<f64>,
}

impl SeriesRow {
    /// Value of a metric for this row, if present.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
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

/// A loaded export series for one commodity over a marketing-year range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedSeries {
    pub info: CommodityInfo,
    pub marketing_years: Vec<MarketYearInfo>,
    pub rows: Vec<SeriesRow>,
}

/// Summary statistics for a metric over a country selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Sum of the metric across all selected countries at the latest week
    pub latest_week: f64,
    /// The latest week-ending date in the selection
    pub latest_date: Option<NaiveDate>,
    /// Display units for the commodity
    pub units: String,
}

/// Weekly aggregate point (summed across the country selection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPoint {
    pub market_year: MarketYear,
    pub week_ending: NaiveDate,
    pub value: f64,
}

/// Weekly aggregate point per country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryWeeklyPoint {
    pub market_year: MarketYear,
    pub week_ending: NaiveDate,
    pub country_name: String,
    pub value: f64,
}

/// One point of a marketing-year comparison curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub week: i32,
    pub value: Option<f64>,
}

/// Weeks-into-marketing-year curve for a single marketing year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearCurve {
    pub market_year: MarketYear,
    pub start_date: Option<NaiveDate>,
    pub points: Vec<CurvePoint>,
}

/// Week number within a marketing year (week 1 contains the start date).
fn weeks_into_marketing_year(week_ending: NaiveDate, my_start: NaiveDate) -> i32 {
    ((week_ending - my_start).num_days().div_euclid(7) + 1) as i32
}

/// Marketing-year calendar for a commodity, with a synthesized entry for the
/// year following the latest upstream release (upstream publishes next-MY
/// sales before the release row for that year exists).
pub async fn marketing_years(
    repo: &dyn FullRepository,
    commodity: CommodityCode,
) -> Result<Vec<MarketYearInfo>, AnalysisError> {
    // Distinguish "commodity unknown" from "commodity known, no data".
    repo.get_commodity_info(commodity)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound { .. } => AnalysisError::UnknownCommodity(commodity),
            other => AnalysisError::Repository(other),
        })?;

    let releases = repo.get_releases(commodity).await?;
    let mut years: Vec<MarketYearInfo> = releases
        .into_iter()
        .map(|r| MarketYearInfo {
            year: r.market_year,
            start: r.market_year_start,
            end: r.market_year_end,
        })
        .collect();
    years.sort_by_key(|y| y.year);

    if let Some(latest) = years.last().cloned() {
        years.push(MarketYearInfo {
            year: latest.year.next(),
            start: latest.start + Months::new(12),
            end: latest.end + Months::new(12),
        });
    }

    Ok(years)
}

/// Distinct marketing years available for a commodity, ascending.
pub async fn years(
    repo: &dyn FullRepository,
    commodity: CommodityCode,
) -> Result<Vec<i32>, AnalysisError> {
    let years = marketing_years(repo, commodity).await?;
    Ok(years.into_iter().map(|y| y.year.value()).collect())
}

/// Countries with data for the commodity and year range, sorted by display
/// name.
pub async fn countries_with_data(
    repo: &dyn FullRepository,
    commodity: CommodityCode,
    start: MarketYear,
    end: MarketYear,
) -> Result<Vec<String>, AnalysisError> {
    if start > end {
        return Err(AnalysisError::InvalidYearRange { start, end });
    }

    repo.get_commodity_info(commodity)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound { .. } => AnalysisError::UnknownCommodity(commodity),
            other => AnalysisError::Repository(other),
        })?;

    let activity = repo.countries_with_data(commodity, start, end).await?;
    Ok(activity.into_iter().map(|a| a.country_name).collect())
}

/// Load the export series for a commodity over an inclusive marketing-year
/// range.
///
/// Splits the upstream next-marketing-year columns into rows of
/// `market_year + 1` (week-1 rows only when both next-MY measures are present
/// and non-zero), annotates each row with its week number within the
/// marketing year, and orders by country then week ascending.
pub async fn load_series(
    repo: &dyn FullRepository,
    commodity: CommodityCode,
    start: MarketYear,
    end: MarketYear,
) -> Result<LoadedSeries, AnalysisError> {
    if start > end {
        return Err(AnalysisError::InvalidYearRange { start, end });
    }

    let info = repo
        .get_commodity_info(commodity)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound { .. } => AnalysisError::UnknownCommodity(commodity),
            other => AnalysisError::Repository(other),
        })?;

    let my_dates = marketing_years(repo, commodity).await?;
    let known_years: BTreeSet<i32> = my_dates.iter().map(|y| y.year.value()).collect();
    let missing: Vec<i32> = (start.value()..=end.value())
        .filter(|y| !known_years.contains(y))
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::YearsNotAvailable { commodity, missing });
    }

    let raw = repo.fetch_series(commodity, start, end).await?;
    if raw.is_empty() {
        warn!(
            "No export data for commodity {} in years {}-{}",
            commodity, start, end
        );
        return Err(AnalysisError::NoData {
            commodity,
            start,
            end,
        });
    }

    let starts: BTreeMap<i32, NaiveDate> = my_dates
        .iter()
        .map(|y| (y.year.value(), y.start))
        .collect();

    // Deduplicate on (week, marketing year, country); rows carrying
    // current-MY measures win over next-MY carryover rows.
    let mut by_key: BTreeMap<(NaiveDate, i32, i32), SeriesRow> = BTreeMap::new();

    for row in &raw {
        let r = &row.record;
        let key = (r.week_ending, r.market_year.value(), r.country.value());
        by_key.insert(
            key,
            SeriesRow {
                country: r.country,
                country_name: row.country_name.clone(),
                market_year: r.market_year,
                week_ending: r.week_ending,
                weeks_into_my: None,
                weekly_exports: Some(r.weekly_exports),
                accumulated_exports: Some(r.accumulated_exports),
                outstanding_sales: Some(r.outstanding_sales),
                gross_new_sales: Some(r.gross_new_sales),
                net_sales: Some(r.net_sales),
                total_commitments: Some(r.total_commitments),
            },
        );
    }

    for row in &raw {
        let r = &row.record;
        if r.next_my_net_sales.is_none() && r.next_my_outstanding_sales.is_none() {
            continue;
        }
        // Week 1 of a marketing year reports leftover next-MY columns from
        // the transition; only keep them when they carry a real value.
        let source_week = starts
            .get(&r.market_year.value())
            .map(|s| weeks_into_marketing_year(r.week_ending, *s));
        if source_week == Some(1) {
            let meaningful = |v: Option<f64>| v.is_some_and(|x| x != 0.0);
            if !meaningful(r.next_my_net_sales) || !meaningful(r.next_my_outstanding_sales) {
                continue;
            }
        }

        let next_year = r.market_year.next();
        let key = (r.week_ending, next_year.value(), r.country.value());
        by_key.entry(key).or_insert(SeriesRow {
            country: r.country,
            country_name: row.country_name.clone(),
            market_year: next_year,
            week_ending: r.week_ending,
            weeks_into_my: None,
            weekly_exports: None,
            accumulated_exports: None,
            outstanding_sales: r.next_my_outstanding_sales,
            gross_new_sales: None,
            net_sales: r.next_my_net_sales,
            total_commitments: None,
        });
    }

    let mut rows: Vec<SeriesRow> = by_key.into_values().collect();
    for row in &mut rows {
        row.weeks_into_my = starts
            .get(&row.market_year.value())
            .map(|s| weeks_into_marketing_year(row.week_ending, *s));
    }
    rows.sort_by(|a, b| {
        a.country_name
            .cmp(&b.country_name)
            .then(a.week_ending.cmp(&b.week_ending))
    });

    info!(
        "Loaded {} series rows for commodity {} (MY {}-{})",
        rows.len(),
        commodity,
        start,
        end
    );

    Ok(LoadedSeries {
        info,
        marketing_years: my_dates,
        rows,
    })
}

/// True when the selection does not restrict countries.
fn unrestricted(countries: Option<&[String]>) -> bool {
    match countries {
        None => true,
        Some(list) => list.is_empty() || list.iter().any(|c| c == ALL_COUNTRIES),
    }
}

fn filtered<'a>(series: &'a LoadedSeries, countries: Option<&[String]>) -> Vec<&'a SeriesRow> {
    match countries {
        Some(wanted) if !unrestricted(countries) => series
            .rows
            .iter()
            .filter(|r| wanted.iter().any(|c| c == &r.country_name))
            .collect(),
        _ => series.rows.iter().collect(),
    }
}

/// Summary statistics for a metric over a country selection.
///
/// When multiple countries share the latest week-ending date, the metric is
/// summed across all of them.
pub fn summary(
    series: &LoadedSeries,
    metric: Metric,
    countries: Option<&[String]>,
) -> MetricSummary {
    let rows = filtered(series, countries);

    let latest_date = rows.iter().map(|r| r.week_ending).max();
    let latest_week = match latest_date {
        Some(date) => rows
            .iter()
            .filter(|r| r.week_ending == date)
            .filter_map(|r| r.metric(metric))
            .sum(),
        None => 0.0,
    };

    MetricSummary {
        latest_week,
        latest_date,
        units: series.info.unit_name.clone(),
    }
}

/// Weekly totals of a metric, grouped by (marketing year, week).
pub fn weekly_points(
    series: &LoadedSeries,
    metric: Metric,
    countries: Option<&[String]>,
) -> Vec<WeeklyPoint> {
    let mut grouped: BTreeMap<(i32, NaiveDate), f64> = BTreeMap::new();
    for row in filtered(series, countries) {
        if let Some(value) = row.metric(metric) {
            *grouped
                .entry((row.market_year.value(), row.week_ending))
                .or_insert(0.0) += value;
        }
    }
    grouped
        .into_iter()
        .map(|((year, week_ending), value)| WeeklyPoint {
            market_year: MarketYear(year),
            week_ending,
            value,
        })
        .collect()
}

/// Weekly totals of a metric, grouped by (marketing year, week, country).
pub fn weekly_points_by_country(
    series: &LoadedSeries,
    metric: Metric,
    countries: Option<&[String]>,
) -> Vec<CountryWeeklyPoint> {
    let mut grouped: BTreeMap<(String, i32, NaiveDate), f64> = BTreeMap::new();
    for row in filtered(series, countries) {
        if let Some(value) = row.metric(metric) {
            *grouped
                .entry((
                    row.country_name.clone(),
                    row.market_year.value(),
                    row.week_ending,
                ))
                .or_insert(0.0) += value;
        }
    }
    grouped
        .into_iter()
        .map(|((country_name, year, week_ending), value)| CountryWeeklyPoint {
            market_year: MarketYear(year),
            week_ending,
            country_name,
            value,
        })
        .collect()
}

/// Marketing-year comparison curves: the metric summed per week-into-MY, one
/// curve per marketing year in the range, densified over `1..=max_week` with
/// missing weeks as `None`.
pub fn marketing_year_curves(
    series: &LoadedSeries,
    metric: Metric,
    countries: Option<&[String]>,
    start: MarketYear,
    end: MarketYear,
) -> Vec<YearCurve> {
    let rows = filtered(series, countries);
    let starts: BTreeMap<i32, NaiveDate> = series
        .marketing_years
        .iter()
        .map(|y| (y.year.value(), y.start))
        .collect();

    let mut curves = Vec::new();
    for year in start.value()..=end.value() {
        let mut grouped: BTreeMap<i32, f64> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.market_year.value() == year) {
            if let (Some(week), Some(value)) = (row.weeks_into_my, row.metric(metric)) {
                *grouped.entry(week).or_insert(0.0) += value;
            }
        }

        // BTreeMap keys are sorted; first/last give the week span.
        let (Some(&first_week), Some(&last_week)) =
            (grouped.keys().next(), grouped.keys().next_back())
        else {
            continue;
        };
        let max_week = last_week;
        let min_week = first_week.min(1);
        let points = (min_week..=max_week)
            .map(|week| CurvePoint {
                week,
                value: grouped.get(&week).copied(),
            })
            .collect();

        curves.push(YearCurve {
            market_year: MarketYear(year),
            start_date: starts.get(&year).copied(),
            points,
        });
    }

    curves
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod analyzer_tests;
