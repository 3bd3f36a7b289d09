use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use super::schema::{
    commodities, countries, data_releases, export_records, regions, units_of_measure,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = commodities)]
pub struct CommodityRow {
    pub commodity_code: i32,
    pub commodity_name: String,
    pub unit_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = countries)]
pub struct CountryRow {
    pub country_code: i32,
    pub country_name: String,
    pub country_description: Option<String>,
    pub region_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = units_of_measure)]
pub struct UnitRow {
    pub unit_id: i32,
    pub unit_name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = regions)]
pub struct RegionRow {
    pub region_id: i32,
    pub region_name: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = export_records)]
#[allow(dead_code)] // updated_at is read only for auditing
pub struct ExportRecordRow {
    pub commodity_code: i32,
    pub country_code: i32,
    pub market_year: i32,
    pub week_ending_date: NaiveDate,
    pub weekly_exports: f64,
    pub accumulated_exports: f64,
    pub outstanding_sales: f64,
    pub gross_new_sales: f64,
    pub net_sales: f64,
    pub total_commitments: f64,
    pub next_my_net_sales: Option<f64>,
    pub next_my_outstanding_sales: Option<f64>,
    pub updated_at: NaiveDateTime,
}

/// Insert/update payload for the fact table. AsChangeset skips the composite
/// primary key columns, which is exactly what the upsert needs.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = export_records)]
pub struct NewExportRecordRow {
    pub commodity_code: i32,
    pub country_code: i32,
    pub market_year: i32,
    pub week_ending_date: NaiveDate,
    pub weekly_exports: f64,
    pub accumulated_exports: f64,
    pub outstanding_sales: f64,
    pub gross_new_sales: f64,
    pub net_sales: f64,
    pub total_commitments: f64,
    pub next_my_net_sales: Option<f64>,
    pub next_my_outstanding_sales: Option<f64>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = data_releases)]
pub struct DataReleaseRow {
    pub commodity_code: i32,
    pub market_year: i32,
    pub release_timestamp: String,
    pub recorded_at: NaiveDateTime,
    pub market_year_start: NaiveDate,
    pub market_year_end: NaiveDate,
}
