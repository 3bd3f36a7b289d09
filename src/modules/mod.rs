//! Registry of named data modules.
//!
//! Each data source is a pluggable module exposing the same capability set:
//! marketing years, countries, chart data, and reports. The web layer selects
//! a module by its URL path segment; which modules exist is decided by
//! configuration at startup, not dynamic discovery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{CommodityCode, MarketYear, Metric};
use crate::db::models::{Commodity, CommodityInfo};
use crate::db::repository::FullRepository;
use crate::services::analyzer::{self, AnalysisError, MetricSummary};
use crate::services::plot::{self, PlotSpec, PlotType};
use crate::services::report::{self, Report, ReportType, ReportView};

/// Parameters for a chart request.
#[derive(Debug, Clone)]
pub struct PlotRequest {
    pub commodity: CommodityCode,
    pub start_year: MarketYear,
    pub end_year: MarketYear,
    /// `None` means all countries
    pub countries: Option<Vec<String>>,
    pub metric: Metric,
    pub plot_type: PlotType,
}

/// Chart data returned to the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotData {
    pub plot: PlotSpec,
    pub summary: MetricSummary,
    pub commodity: CommodityInfo,
}

/// Capability set every data module provides.
///
/// Mirrors the endpoints of §6: years, countries, chart data, and reports,
/// keyed by commodity.
#[async_trait]
pub trait DataModule: Send + Sync {
    /// URL path segment identifying the module.
    fn name(&self) -> &str;

    /// Human-readable module title.
    fn title(&self) -> &str;

    async fn list_commodities(&self) -> Result<Vec<Commodity>, AnalysisError>;

    async fn get_years(&self, commodity: CommodityCode) -> Result<Vec<i32>, AnalysisError>;

    async fn get_countries(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> Result<Vec<String>, AnalysisError>;

    async fn get_plot_data(&self, request: PlotRequest) -> Result<PlotData, AnalysisError>;

    async fn generate_report(
        &self,
        commodity: CommodityCode,
        report_type: ReportType,
        view: ReportView,
    ) -> Result<Report, AnalysisError>;
}

/// Weekly Export Sales data module backed by the ESR schema.
pub struct ExportSalesModule {
    name: String,
    title: String,
    repository: Arc<dyn FullRepository>,
}

impl ExportSalesModule {
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        Self {
            name: "weekly_exports".to_string(),
            title: "Weekly Export Sales".to_string(),
            repository,
        }
    }
}

#[async_trait]
impl DataModule for ExportSalesModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }

    async fn list_commodities(&self) -> Result<Vec<Commodity>, AnalysisError> {
        Ok(self.repository.list_commodities().await?)
    }

    async fn get_years(&self, commodity: CommodityCode) -> Result<Vec<i32>, AnalysisError> {
        analyzer::years(self.repository.as_ref(), commodity).await
    }

    async fn get_countries(
        &self,
        commodity: CommodityCode,
        start_year: MarketYear,
        end_year: MarketYear,
    ) -> Result<Vec<String>, AnalysisError> {
        analyzer::countries_with_data(self.repository.as_ref(), commodity, start_year, end_year)
            .await
    }

    async fn get_plot_data(&self, request: PlotRequest) -> Result<PlotData, AnalysisError> {
        let repo = self.repository.as_ref();
        let series =
            analyzer::load_series(repo, request.commodity, request.start_year, request.end_year)
                .await?;

        let countries = request.countries.as_deref();
        let summary = analyzer::summary(&series, request.metric, countries);

        let plot = match request.plot_type {
            PlotType::Weekly => {
                let points = analyzer::weekly_points(&series, request.metric, countries);
                plot::weekly_plot(
                    &points,
                    request.metric,
                    &summary.units,
                    request.start_year,
                    request.end_year,
                    countries,
                )
            }
            PlotType::Country => {
                let points = analyzer::weekly_points_by_country(&series, request.metric, countries);
                plot::country_plot(
                    &points,
                    request.metric,
                    &summary.units,
                    request.start_year,
                    request.end_year,
                    countries,
                )
            }
            PlotType::MyComparison => {
                let curves = analyzer::marketing_year_curves(
                    &series,
                    request.metric,
                    countries,
                    request.start_year,
                    request.end_year,
                );
                plot::my_comparison_plot(&curves, request.metric, &summary.units, countries)
            }
        };

        Ok(PlotData {
            plot,
            summary,
            commodity: series.info,
        })
    }

    async fn generate_report(
        &self,
        commodity: CommodityCode,
        report_type: ReportType,
        view: ReportView,
    ) -> Result<Report, AnalysisError> {
        report::generate(self.repository.as_ref(), commodity, report_type, view).await
    }
}

/// Module descriptor for the landing listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub title: String,
}

/// Registry mapping module names to providers.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn DataModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under its own name.
    pub fn register(&mut self, module: Arc<dyn DataModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DataModule>> {
        self.modules.get(name).cloned()
    }

    /// Describe all registered modules, sorted by name.
    pub fn list(&self) -> Vec<ModuleDescriptor> {
        self.modules
            .values()
            .map(|m| ModuleDescriptor {
                name: m.name().to_string(),
                title: m.title().to_string(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalRepository;

    #[test]
    fn test_registry_lookup() {
        let repo = Arc::new(LocalRepository::new());
        let mut registry = ModuleRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(ExportSalesModule::new(repo)));

        assert!(registry.get("weekly_exports").is_some());
        assert!(registry.get("futures").is_none());

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "weekly_exports");
        assert_eq!(listed[0].title, "Weekly Export Sales");
    }

    #[tokio::test]
    async fn test_module_lists_commodities() {
        use crate::db::models::{Commodity, UnitOfMeasure};

        let repo = Arc::new(LocalRepository::new());
        repo.seed_reference(
            vec![Commodity {
                code: CommodityCode(101),
                name: "Wheat".to_string(),
                unit_id: 1,
            }],
            vec![],
            vec![UnitOfMeasure {
                unit_id: 1,
                name: "Metric Tons".to_string(),
            }],
        );

        let module = ExportSalesModule::new(repo);
        let commodities = module.list_commodities().await.unwrap();
        assert_eq!(commodities.len(), 1);
        assert_eq!(commodities[0].name, "Wheat");
    }
}
