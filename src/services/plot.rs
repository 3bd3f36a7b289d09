//! Chart-spec assembly for the dashboard frontend.
//!
//! Builds plotly-shaped figure JSON (`{data: [...], layout: {...}}`) from the
//! analyzer's aggregates. The browser hands the spec to the charting library
//! unchanged; nothing here renders.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::analyzer::{CountryWeeklyPoint, WeeklyPoint, YearCurve};
use crate::api::{MarketYear, Metric, ALL_COUNTRIES};

/// Requested figure shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotType {
    /// One bar trace per marketing year over week-ending dates
    #[serde(rename = "weekly")]
    Weekly,
    /// Stacked bar traces per country
    #[serde(rename = "country")]
    Country,
    /// Line traces over weeks-into-marketing-year, one per year
    #[serde(rename = "my_comparison")]
    MyComparison,
}

/// A single plotly trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub trace_type: String,
    pub name: String,
    pub x: Vec<serde_json::Value>,
    pub y: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Axis settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickmode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtick: Option<f64>,
}

/// Figure layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub title: String,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub showlegend: bool,
    pub height: u32,
    pub width: u32,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
}

impl Layout {
    fn new(title: impl Into<String>, x_title: impl Into<String>, y_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            xaxis: Axis {
                title: x_title.into(),
                ..Default::default()
            },
            yaxis: Axis {
                title: y_title.into(),
                ..Default::default()
            },
            showlegend: true,
            height: 700,
            width: 1000,
            template: "plotly_white".to_string(),
            barmode: None,
        }
    }
}

/// Complete figure specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotSpec {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl PlotSpec {
    /// Placeholder figure for an empty selection.
    pub fn empty() -> Self {
        Self {
            data: vec![],
            layout: Layout::new("No data available", "", ""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// "MY 2022/2023" style trace label.
fn marketing_year_label(year: MarketYear) -> String {
    format!("MY {}/{}", year.value() - 1, year.value())
}

/// Chart-title suffix for a restricted country selection.
fn title_suffix(countries: Option<&[String]>) -> String {
    match countries {
        Some(list)
            if !list.is_empty() && !list.iter().any(|c| c == ALL_COUNTRIES) =>
        {
            if list.len() <= 3 {
                format!(" - {}", list.join(", "))
            } else {
                format!(" - {} Countries", list.len())
            }
        }
        _ => String::new(),
    }
}

fn date_value(date: chrono::NaiveDate) -> serde_json::Value {
    serde_json::Value::String(date.format("%Y-%m-%d").to_string())
}

/// Weekly trend figure: one bar trace per marketing year.
pub fn weekly_plot(
    points: &[WeeklyPoint],
    metric: Metric,
    units: &str,
    start: MarketYear,
    end: MarketYear,
    countries: Option<&[String]>,
) -> PlotSpec {
    if points.is_empty() {
        return PlotSpec::empty();
    }

    let mut by_year: BTreeMap<i32, Vec<&WeeklyPoint>> = BTreeMap::new();
    for p in points {
        by_year.entry(p.market_year.value()).or_default().push(p);
    }

    let data = by_year
        .into_iter()
        .map(|(year, year_points)| Trace {
            trace_type: "bar".to_string(),
            name: marketing_year_label(MarketYear(year)),
            x: year_points.iter().map(|p| date_value(p.week_ending)).collect(),
            y: year_points.iter().map(|p| Some(p.value)).collect(),
            mode: None,
        })
        .collect();

    let mut layout = Layout::new(
        format!(
            "{} - Weekly Trend (MY {}-{}){}",
            metric.display_name(),
            start,
            end,
            title_suffix(countries)
        ),
        "Week Ending Date",
        units,
    );
    layout.barmode = Some("overlay".to_string());

    PlotSpec { data, layout }
}

/// Weekly trend by destination: stacked bar traces per country.
pub fn country_plot(
    points: &[CountryWeeklyPoint],
    metric: Metric,
    units: &str,
    start: MarketYear,
    end: MarketYear,
    countries: Option<&[String]>,
) -> PlotSpec {
    if points.is_empty() {
        return PlotSpec::empty();
    }

    let mut by_country: BTreeMap<&str, Vec<&CountryWeeklyPoint>> = BTreeMap::new();
    for p in points {
        by_country.entry(&p.country_name).or_default().push(p);
    }

    let data = by_country
        .into_iter()
        .map(|(country, country_points)| {
            let mut country_points = country_points;
            country_points.sort_by_key(|p| p.week_ending);
            Trace {
                trace_type: "bar".to_string(),
                name: country.to_string(),
                x: country_points
                    .iter()
                    .map(|p| date_value(p.week_ending))
                    .collect(),
                y: country_points.iter().map(|p| Some(p.value)).collect(),
                mode: None,
            }
        })
        .collect();

    let mut layout = Layout::new(
        format!(
            "{} - Weekly Trend by Country (MY {}-{}){}",
            metric.display_name(),
            start,
            end,
            title_suffix(countries)
        ),
        "Week Ending Date",
        units,
    );
    layout.barmode = Some("stack".to_string());

    PlotSpec { data, layout }
}

/// Marketing-year comparison figure: line traces over weeks-into-MY.
pub fn my_comparison_plot(
    curves: &[YearCurve],
    metric: Metric,
    units: &str,
    countries: Option<&[String]>,
) -> PlotSpec {
    if curves.is_empty() {
        return PlotSpec::empty();
    }

    let data = curves
        .iter()
        .map(|curve| {
            let start_label = curve
                .start_date
                .map(|d| d.format("%b %d").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            Trace {
                trace_type: "scatter".to_string(),
                name: format!(
                    "{} (Start: {})",
                    marketing_year_label(curve.market_year),
                    start_label
                ),
                x: curve
                    .points
                    .iter()
                    .map(|p| serde_json::Value::from(p.week))
                    .collect(),
                y: curve.points.iter().map(|p| p.value).collect(),
                mode: Some("lines".to_string()),
            }
        })
        .collect();

    let mut layout = Layout::new(
        format!(
            "Weekly {} - Marketing Year Comparison{}",
            metric.display_name(),
            title_suffix(countries)
        ),
        "Weeks into Marketing Year",
        units,
    );
    layout.xaxis.tickmode = Some("linear".to_string());
    layout.xaxis.dtick = Some(4.0);

    PlotSpec { data, layout }
}

#[cfg(test)]
#[path = "plot_tests.rs"]
mod plot_tests;
