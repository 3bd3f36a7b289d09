//! Public API surface shared across the crate.
//!
//! Identifier newtypes for the entities of the export sales schema, plus the
//! metric enumeration used by the plot and report endpoints. All types derive
//! Serialize/Deserialize for JSON serialization.

use serde::{Deserialize, Serialize};

/// USDA commodity code (e.g. 101 for wheat).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommodityCode(pub i32);

/// USDA country code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountryCode(pub i32);

/// Marketing year. Commodity-specific 52/53-week accounting period; treated
/// as an opaque integer supplied by the upstream source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketYear(pub i32);

impl CommodityCode {
    pub fn new(value: i32) -> Self {
        CommodityCode(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl CountryCode {
    pub fn new(value: i32) -> Self {
        CountryCode(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl MarketYear {
    pub fn new(value: i32) -> Self {
        MarketYear(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// The following marketing year.
    pub fn next(&self) -> Self {
        MarketYear(self.0 + 1)
    }
}

impl std::fmt::Display for CommodityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for MarketYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CommodityCode> for i32 {
    fn from(code: CommodityCode) -> Self {
        code.0
    }
}
impl From<CountryCode> for i32 {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}
impl From<MarketYear> for i32 {
    fn from(year: MarketYear) -> Self {
        year.0
    }
}

/// Country-name sentinel meaning "no country filter".
pub const ALL_COUNTRIES: &str = "All Countries";

/// Measures carried by each export record, as selectable by the frontend.
///
/// Wire names match the upstream ESR column names (`weeklyExports`, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "weeklyExports")]
    WeeklyExports,
    #[serde(rename = "accumulatedExports")]
    AccumulatedExports,
    #[serde(rename = "outstandingSales")]
    OutstandingSales,
    #[serde(rename = "grossNewSales")]
    GrossNewSales,
    #[serde(rename = "netSales")]
    NetSales,
    #[serde(rename = "totalCommitment")]
    TotalCommitments,
}

impl Metric {
    /// All metrics, in display order.
    pub const ALL: [Metric; 6] = [
        Metric::WeeklyExports,
        Metric::AccumulatedExports,
        Metric::OutstandingSales,
        Metric::GrossNewSales,
        Metric::NetSales,
        Metric::TotalCommitments,
    ];

    /// Human-readable name used in chart titles and report columns.
    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::WeeklyExports => "Weekly Exports",
            Metric::AccumulatedExports => "Accumulated Exports",
            Metric::OutstandingSales => "Outstanding Sales",
            Metric::GrossNewSales => "Gross New Sales",
            Metric::NetSales => "Net Sales",
            Metric::TotalCommitments => "Total Commitment",
        }
    }

    /// Upstream column name.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::WeeklyExports => "weeklyExports",
            Metric::AccumulatedExports => "accumulatedExports",
            Metric::OutstandingSales => "outstandingSales",
            Metric::GrossNewSales => "grossNewSales",
            Metric::NetSales => "netSales",
            Metric::TotalCommitments => "totalCommitment",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_year_next() {
        assert_eq!(MarketYear::new(2023).next(), MarketYear(2024));
    }

    #[test]
    fn test_metric_wire_names() {
        let json = serde_json::to_string(&Metric::WeeklyExports).unwrap();
        assert_eq!(json, "\"weeklyExports\"");

        let metric: Metric = serde_json::from_str("\"totalCommitment\"").unwrap();
        assert_eq!(metric, Metric::TotalCommitments);
    }

    #[test]
    fn test_metric_display() {
        assert_eq!(Metric::GrossNewSales.to_string(), "Gross New Sales");
    }

    #[test]
    fn test_commodity_code_roundtrip() {
        let code = CommodityCode::new(101);
        assert_eq!(code.value(), 101);
        assert_eq!(i32::from(code), 101);
        assert_eq!(code.to_string(), "101");
    }
}
