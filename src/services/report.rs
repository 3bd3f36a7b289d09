//! Structured report generation.
//!
//! Produces standardized report documents from the export fact table,
//! complementing the interactive charts. A report is always a well-formed
//! document: when no data is available for the selection the document carries
//! `data_available: false` and a human-readable message instead of tables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::analyzer::AnalysisError;
use crate::api::{CommodityCode, Metric};
use crate::db::models::{CommodityInfo, ExportSeriesRow};
use crate::db::repository::{FullRepository, RepositoryError};

/// Report period selector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Weekly,
    Monthly,
    Yearly,
}

/// Metric-view selector: which measure columns appear in the tables.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportView {
    All,
    Exports,
    Sales,
    Commitments,
}

impl ReportView {
    /// Metrics shown under this view, in column order.
    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            ReportView::All => Metric::ALL.to_vec(),
            ReportView::Exports => vec![Metric::WeeklyExports, Metric::AccumulatedExports],
            ReportView::Sales => vec![
                Metric::OutstandingSales,
                Metric::GrossNewSales,
                Metric::NetSales,
            ],
            ReportView::Commitments => vec![Metric::TotalCommitments],
        }
    }
}

/// One table of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// One row of a report table; `values` align with the table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/// A complete report document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub commodity_info: CommodityInfo,
    pub report_type: ReportType,
    pub view: ReportView,
    pub report_date: Option<NaiveDate>,
    pub data_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub tables: Vec<ReportTable>,
}

impl Report {
    fn unavailable(
        commodity_info: CommodityInfo,
        report_type: ReportType,
        view: ReportView,
        message: impl Into<String>,
    ) -> Self {
        Self {
            commodity_info,
            report_type,
            view,
            report_date: None,
            data_available: false,
            message: Some(message.into()),
            tables: vec![],
        }
    }
}

/// Snapshot metrics report a level at a point in time; flow metrics report
/// activity within the week and are summed over periods.
fn is_level_metric(metric: Metric) -> bool {
    matches!(
        metric,
        Metric::AccumulatedExports | Metric::OutstandingSales | Metric::TotalCommitments
    )
}

fn metric_columns(view: ReportView) -> Vec<String> {
    view.metrics()
        .iter()
        .map(|m| m.display_name().to_string())
        .collect()
}

fn totals_for(rows: &[ExportSeriesRow], metrics: &[Metric]) -> Vec<Option<f64>> {
    metrics
        .iter()
        .map(|m| Some(rows.iter().map(|r| r.record.metric(*m)).sum()))
        .collect()
}

/// Main entry point for report generation.
///
/// # Returns
/// * `Ok(Report)` - Well-formed document; `data_available` is false when the
///   selection holds no rows
/// * `Err(AnalysisError::UnknownCommodity)` - If the commodity code is unknown
pub async fn generate(
    repo: &dyn FullRepository,
    commodity: CommodityCode,
    report_type: ReportType,
    view: ReportView,
) -> Result<Report, AnalysisError> {
    let info = repo
        .get_commodity_info(commodity)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound { .. } => AnalysisError::UnknownCommodity(commodity),
            other => AnalysisError::Repository(other),
        })?;

    match report_type {
        ReportType::Weekly => weekly_report(repo, info, view).await,
        ReportType::Monthly => monthly_report(repo, info, view).await,
        ReportType::Yearly => yearly_report(repo, info, view).await,
    }
}

/// Weekly report: latest-week destinations and week-over-week changes.
async fn weekly_report(
    repo: &dyn FullRepository,
    info: CommodityInfo,
    view: ReportView,
) -> Result<Report, AnalysisError> {
    let commodity = info.commodity_code;
    let weeks = repo.latest_weeks(commodity, 2).await?;
    let Some(&latest) = weeks.first() else {
        return Ok(Report::unavailable(
            info,
            ReportType::Weekly,
            view,
            "No export data has been collected for this commodity",
        ));
    };

    let metrics = view.metrics();
    let mut current = repo.fetch_records_for_week(commodity, latest).await?;
    current.sort_by(|a, b| {
        b.record
            .weekly_exports
            .partial_cmp(&a.record.weekly_exports)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.country_name.cmp(&b.country_name))
    });

    let mut destination_rows: Vec<ReportRow> = current
        .iter()
        .map(|r| ReportRow {
            label: r.country_name.clone(),
            values: metrics.iter().map(|m| Some(r.record.metric(*m))).collect(),
        })
        .collect();
    destination_rows.push(ReportRow {
        label: "All Destinations".to_string(),
        values: totals_for(&current, &metrics),
    });

    let mut tables = vec![ReportTable {
        title: format!("Top Destinations - Week Ending {}", latest.format("%Y-%m-%d")),
        columns: metric_columns(view),
        rows: destination_rows,
    }];

    if let Some(&prior) = weeks.get(1) {
        let previous = repo.fetch_records_for_week(commodity, prior).await?;
        let current_totals = totals_for(&current, &metrics);
        let prior_totals = totals_for(&previous, &metrics);

        let rows = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let now = current_totals[i];
                let before = prior_totals[i];
                let change = match (now, before) {
                    (Some(n), Some(b)) => Some(n - b),
                    _ => None,
                };
                ReportRow {
                    label: m.display_name().to_string(),
                    values: vec![now, before, change],
                }
            })
            .collect();

        tables.push(ReportTable {
            title: format!(
                "Week-over-Week Change ({} vs {})",
                latest.format("%Y-%m-%d"),
                prior.format("%Y-%m-%d")
            ),
            columns: vec![
                "This Week".to_string(),
                "Prior Week".to_string(),
                "Change".to_string(),
            ],
            rows,
        });
    }

    Ok(Report {
        commodity_info: info,
        report_type: ReportType::Weekly,
        view,
        report_date: Some(latest),
        data_available: true,
        message: None,
        tables,
    })
}

/// Monthly report: the last four reporting weeks aggregated by destination.
///
/// ESR publishes weekly; a "reporting month" here is the four most recent
/// week-ending dates, which keeps marketing-year boundaries opaque.
async fn monthly_report(
    repo: &dyn FullRepository,
    info: CommodityInfo,
    view: ReportView,
) -> Result<Report, AnalysisError> {
    let commodity = info.commodity_code;
    let weeks = repo.latest_weeks(commodity, 4).await?;
    let Some(&latest) = weeks.first() else {
        return Ok(Report::unavailable(
            info,
            ReportType::Monthly,
            view,
            "No export data has been collected for this commodity",
        ));
    };

    let metrics = view.metrics();
    let mut by_country: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
    let mut all_rows: Vec<ExportSeriesRow> = Vec::new();

    for &week in &weeks {
        let rows = repo.fetch_records_for_week(commodity, week).await?;
        for row in &rows {
            let entry = by_country
                .entry(row.country_name.clone())
                .or_insert_with(|| vec![None; metrics.len()]);
            for (i, m) in metrics.iter().enumerate() {
                // Flows accumulate over the weeks; levels keep the most
                // recent week's value (weeks iterate newest first).
                let value = row.record.metric(*m);
                if is_level_metric(*m) {
                    if entry[i].is_none() {
                        entry[i] = Some(value);
                    }
                } else {
                    entry[i] = Some(entry[i].unwrap_or(0.0) + value);
                }
            }
        }
        all_rows.extend(rows);
    }

    let mut rows: Vec<ReportRow> = by_country
        .into_iter()
        .map(|(label, values)| ReportRow { label, values })
        .collect();
    rows.sort_by(|a, b| {
        let av = a.values.first().copied().flatten().unwrap_or(0.0);
        let bv = b.values.first().copied().flatten().unwrap_or(0.0);
        bv.partial_cmp(&av)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.label.cmp(&b.label))
    });

    let oldest = *weeks.last().unwrap_or(&latest);
    Ok(Report {
        commodity_info: info,
        report_type: ReportType::Monthly,
        view,
        report_date: Some(latest),
        data_available: true,
        message: None,
        tables: vec![ReportTable {
            title: format!(
                "Destinations, Weeks {} through {}",
                oldest.format("%Y-%m-%d"),
                latest.format("%Y-%m-%d")
            ),
            columns: metric_columns(view),
            rows,
        }],
    })
}

/// Yearly report: marketing-year comparison across the commodity's releases.
async fn yearly_report(
    repo: &dyn FullRepository,
    info: CommodityInfo,
    view: ReportView,
) -> Result<Report, AnalysisError> {
    let commodity = info.commodity_code;
    let releases = repo.get_releases(commodity).await?;
    if releases.is_empty() {
        return Ok(Report::unavailable(
            info,
            ReportType::Yearly,
            view,
            "No marketing year data is available for this commodity",
        ));
    }

    let metrics = view.metrics();
    let mut rows = Vec::new();
    let mut report_date: Option<NaiveDate> = None;

    for release in &releases {
        let year = release.market_year;
        let series = repo.fetch_series(commodity, year, year).await?;
        if series.is_empty() {
            continue;
        }

        let Some(year_latest) = series.iter().map(|r| r.record.week_ending).max() else {
            continue;
        };
        report_date = report_date.max(Some(year_latest));

        let values = metrics
            .iter()
            .map(|m| {
                // Levels are read at the latest reported week of the year;
                // flows are summed over the whole year.
                let total = if is_level_metric(*m) {
                    series
                        .iter()
                        .filter(|r| r.record.week_ending == year_latest)
                        .map(|r| r.record.metric(*m))
                        .sum()
                } else {
                    series.iter().map(|r| r.record.metric(*m)).sum()
                };
                Some(total)
            })
            .collect();

        rows.push(ReportRow {
            label: format!("MY {}/{}", year.value() - 1, year.value()),
            values,
        });
    }

    if rows.is_empty() {
        return Ok(Report::unavailable(
            info,
            ReportType::Yearly,
            view,
            "No export data has been collected for this commodity",
        ));
    }

    Ok(Report {
        commodity_info: info,
        report_type: ReportType::Yearly,
        view,
        report_date,
        data_available: true,
        message: None,
        tables: vec![ReportTable {
            title: "Marketing Year Comparison".to_string(),
            columns: metric_columns(view),
            rows,
        }],
    })
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod report_tests;
