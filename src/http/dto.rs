//! Data Transfer Objects for the HTTP API.
//!
//! Module endpoints answer with an envelope: `{success: true, ...payload}`
//! on success and `{success: false, error}` when the selection cannot be
//! served (unknown commodity, no data in range, invalid year range). The
//! browser only ever sees a well-formed JSON body.

use serde::{Deserialize, Serialize};

use crate::api::Metric;
use crate::db::models::{Commodity, CommodityInfo};
use crate::modules::{ModuleDescriptor, PlotData};
use crate::services::analyzer::MetricSummary;
use crate::services::plot::{PlotSpec, PlotType};
use crate::services::report::{Report, ReportType, ReportView};

/// Success/failure envelope wrapping a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    /// Flattened payload fields; absent entirely on failure
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

// ==================== Requests ====================

/// Request body for the years endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearsRequest {
    pub commodity_code: i32,
}

/// Request body for the countries endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountriesRequest {
    pub commodity_code: i32,
    pub start_year: i32,
    pub end_year: i32,
}

/// Request body for the plot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotRequestDto {
    pub commodity_code: i32,
    pub start_year: i32,
    pub end_year: i32,
    /// Selected country names; empty or containing "All Countries" means no
    /// filter
    #[serde(default)]
    pub countries: Vec<String>,
    pub metric: Metric,
    pub plot_type: PlotType,
}

/// Request body for the report endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequestDto {
    pub commodity_code: i32,
    #[serde(default = "default_report_type")]
    pub report_type: ReportType,
    #[serde(default = "default_view_type")]
    pub view_type: ReportView,
}

fn default_report_type() -> ReportType {
    ReportType::Weekly
}

fn default_view_type() -> ReportView {
    ReportView::All
}

// ==================== Payloads ====================

/// Years payload: distinct marketing years, ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearsPayload {
    pub years: Vec<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
}

impl YearsPayload {
    pub fn new(years: Vec<i32>) -> Self {
        let min_year = years.first().copied();
        let max_year = years.last().copied();
        Self {
            years,
            min_year,
            max_year,
        }
    }
}

/// Countries payload: names sorted alphabetically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountriesPayload {
    pub countries: Vec<String>,
}

/// Commodity listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommodityDto {
    pub commodity_code: i32,
    pub commodity_name: String,
}

impl From<Commodity> for CommodityDto {
    fn from(c: Commodity) -> Self {
        Self {
            commodity_code: c.code.value(),
            commodity_name: c.name,
        }
    }
}

/// Commodity listing payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommoditiesPayload {
    pub commodities: Vec<CommodityDto>,
}

/// Commodity metadata attached to a plot response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommodityMetaDto {
    pub name: String,
    pub unit: String,
}

impl From<CommodityInfo> for CommodityMetaDto {
    fn from(info: CommodityInfo) -> Self {
        Self {
            name: info.commodity_name,
            unit: info.unit_name,
        }
    }
}

/// Summary block of a plot response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDto {
    pub latest_week: f64,
    pub latest_date: String,
    pub units: String,
}

impl From<MetricSummary> for SummaryDto {
    fn from(summary: MetricSummary) -> Self {
        Self {
            latest_week: summary.latest_week,
            latest_date: summary
                .latest_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            units: summary.units,
        }
    }
}

/// Plot payload: chart spec plus summary and commodity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotPayload {
    pub plot: PlotSpec,
    pub summary: SummaryDto,
    pub commodity: CommodityMetaDto,
}

impl From<PlotData> for PlotPayload {
    fn from(data: PlotData) -> Self {
        Self {
            plot: data.plot,
            summary: data.summary.into(),
            commodity: data.commodity.into(),
        }
    }
}

/// Report payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report: Report,
}

// ==================== Non-envelope responses ====================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// Module listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleListResponse {
    pub modules: Vec<ModuleDescriptor>,
    pub total: usize,
}
