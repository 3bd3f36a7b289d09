//! Service layer for business logic and orchestration.
//!
//! This module contains the service layer that sits between the database
//! operations and the HTTP layer. Services orchestrate repository calls and
//! implement the data processing: series loading, summaries, chart specs,
//! reports, and upstream collection.

pub mod analyzer;

pub mod collector;

pub mod plot;

pub mod report;

pub use analyzer::{
    countries_with_data, load_series, marketing_years, summary, years, AnalysisError,
    LoadedSeries, MetricSummary,
};
pub use collector::{CollectError, CollectOutcome, Collector, CollectorConfig, EsrClient};
pub use plot::{PlotSpec, PlotType};
pub use report::{Report, ReportType, ReportView};
