//! HTTP handlers for the REST API.
//!
//! Each handler resolves the target data module from the URL, delegates to
//! its capability set, and renders the result into the success/failure
//! envelope. Recoverable selection errors (unknown commodity, no data,
//! invalid year range) become `{success: false, error}` with HTTP 200;
//! only unknown modules and internal failures surface as HTTP errors.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::dto::{
    CommoditiesPayload, CommodityDto, CountriesPayload, Envelope, HealthResponse,
    ModuleListResponse, PlotPayload, PlotRequestDto, ReportPayload, ReportRequestDto,
    YearsPayload, YearsRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{CommodityCode, MarketYear, ALL_COUNTRIES};
use crate::modules::{DataModule, PlotRequest};
use crate::services::analyzer::AnalysisError;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn resolve_module(state: &AppState, name: &str) -> Result<Arc<dyn DataModule>, AppError> {
    state
        .registry
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("Module {} not found", name)))
}

/// Render a service result into the envelope, recovering selection errors.
fn envelope_from<T>(result: Result<T, AnalysisError>) -> Result<Envelope<T>, AppError> {
    match result {
        Ok(payload) => Ok(Envelope::ok(payload)),
        Err(e) if e.is_recoverable() => Ok(Envelope::failure(e.to_string())),
        Err(AnalysisError::Repository(e)) => Err(AppError::Repository(e)),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

/// Normalize the wire-level country selection: empty or sentinel-bearing
/// lists mean "no filter".
fn normalize_countries(countries: Vec<String>) -> Option<Vec<String>> {
    if countries.is_empty() || countries.iter().any(|c| c == ALL_COUNTRIES) {
        None
    } else {
        Some(countries)
    }
}

// =============================================================================
// Health & Landing
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and the database
/// is accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match state.repository.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

/// GET /modules
///
/// List the registered data modules.
pub async fn list_modules(State(state): State<AppState>) -> HandlerResult<ModuleListResponse> {
    let modules = state.registry.list();
    let total = modules.len();
    Ok(Json(ModuleListResponse { modules, total }))
}

// =============================================================================
// Module Endpoints
// =============================================================================

/// GET /modules/{module}/commodities
///
/// List the commodities available in a module, sorted by display name.
pub async fn list_commodities(
    State(state): State<AppState>,
    Path(module): Path<String>,
) -> HandlerResult<Envelope<CommoditiesPayload>> {
    let module = resolve_module(&state, &module)?;
    let result = module.list_commodities().await.map(|commodities| {
        CommoditiesPayload {
            commodities: commodities.into_iter().map(CommodityDto::from).collect(),
        }
    });
    Ok(Json(envelope_from(result)?))
}

/// POST /modules/{module}/get_years
///
/// Get available marketing years for a selected commodity.
pub async fn get_years(
    State(state): State<AppState>,
    Path(module): Path<String>,
    Json(request): Json<YearsRequest>,
) -> HandlerResult<Envelope<YearsPayload>> {
    let module = resolve_module(&state, &module)?;
    let result = module
        .get_years(CommodityCode(request.commodity_code))
        .await
        .map(YearsPayload::new);
    Ok(Json(envelope_from(result)?))
}

/// POST /modules/{module}/get_countries
///
/// Get countries with available data for the selected commodity and years.
pub async fn get_countries(
    State(state): State<AppState>,
    Path(module): Path<String>,
    Json(request): Json<super::dto::CountriesRequest>,
) -> HandlerResult<Envelope<CountriesPayload>> {
    let module = resolve_module(&state, &module)?;
    let result = module
        .get_countries(
            CommodityCode(request.commodity_code),
            MarketYear(request.start_year),
            MarketYear(request.end_year),
        )
        .await
        .map(|countries| CountriesPayload { countries });
    Ok(Json(envelope_from(result)?))
}

/// POST /modules/{module}/get_plot
///
/// Generate a chart spec and summary for the selected parameters.
pub async fn get_plot(
    State(state): State<AppState>,
    Path(module): Path<String>,
    Json(request): Json<PlotRequestDto>,
) -> HandlerResult<Envelope<PlotPayload>> {
    let module = resolve_module(&state, &module)?;
    let result = module
        .get_plot_data(PlotRequest {
            commodity: CommodityCode(request.commodity_code),
            start_year: MarketYear(request.start_year),
            end_year: MarketYear(request.end_year),
            countries: normalize_countries(request.countries),
            metric: request.metric,
            plot_type: request.plot_type,
        })
        .await
        .map(PlotPayload::from);
    Ok(Json(envelope_from(result)?))
}

/// POST /modules/{module}/generate_report
///
/// Generate a structured report document.
pub async fn generate_report(
    State(state): State<AppState>,
    Path(module): Path<String>,
    Json(request): Json<ReportRequestDto>,
) -> HandlerResult<Envelope<ReportPayload>> {
    let module = resolve_module(&state, &module)?;
    let result = module
        .generate_report(
            CommodityCode(request.commodity_code),
            request.report_type,
            request.view_type,
        )
        .await
        .map(|report| ReportPayload { report });
    Ok(Json(envelope_from(result)?))
}
