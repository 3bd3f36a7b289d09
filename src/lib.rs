//! # ESR Dashboard Backend
//!
//! Backend for the USDA Export Sales Reporting (ESR) dashboard.
//!
//! This crate ingests weekly export sales data from the USDA FAS ESR API,
//! stores it in a per-module relational database, and serves chart-ready
//! JSON and tabular reports to a browser frontend over a REST API.
//!
//! ## Features
//!
//! - **Collection**: Fetch export records per commodity and marketing year,
//!   with API key rotation and atomic per-batch upserts
//! - **Analysis**: Time-series loading, marketing-year reshaping, and summary
//!   statistics over the export fact table
//! - **Plots**: Chart-spec JSON (weekly, by-country, marketing-year comparison)
//! - **Reports**: Structured weekly/monthly/yearly report documents
//! - **HTTP API**: axum-based endpoints consumed by the dashboard frontend
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: Identifier newtypes and shared API types
//! - [`db`]: Database operations, repository pattern, and persistence layer
//! - [`services`]: Analyzer, plot builder, report generator, and collector
//! - [`modules`]: Registry of named data modules (pluggable data sources)
//! - [`http`]: Axum-based HTTP server and request handlers

pub mod api;

pub mod db;

pub mod modules;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
