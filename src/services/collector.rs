//! Data collection from the USDA FAS ESR API.
//!
//! The collector refreshes the reference tables, diffs upstream release
//! timestamps against the stored bookkeeping, and upserts one batch per
//! (commodity, marketing year) that needs updating. Each batch is applied
//! atomically: a mid-stream fetch failure leaves prior data untouched and the
//! run moves on to the next batch.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{CommodityCode, CountryCode, MarketYear};
use crate::db::models::{
    Commodity, Country, DataRelease, ExportRecord, Region, UnitOfMeasure,
};
use crate::db::repo_config::CollectorSettings;
use crate::db::repository::{FullRepository, RepositoryError};

/// Errors surfaced by the collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Upstream request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream returned an empty response for {endpoint}")]
    EmptyResponse { endpoint: String },

    #[error("Maximum retries ({attempts}) exceeded for {endpoint}")]
    MaxRetries { endpoint: String, attempts: u32 },

    #[error("No API keys configured")]
    NoApiKeys,

    #[error("Could not parse week ending date '{value}'")]
    BadDate { value: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Collector configuration (upstream URL, keys, retry policy).
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub base_url: String,
    pub api_keys: Vec<String>,
    pub rate_limit_threshold: i64,
    pub retry_delay: Duration,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl CollectorConfig {
    pub fn from_settings(settings: &CollectorSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_keys: settings.api_keys.clone(),
            rate_limit_threshold: settings.rate_limit_threshold,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            max_retries: settings.max_retries,
            request_timeout: Duration::from_secs(settings.request_timeout_sec),
        }
    }
}

#[derive(Debug, Clone)]
struct ApiKey {
    key: String,
    rate_limit_remaining: Option<i64>,
}

// ==================== Wire types ====================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrCommodity {
    pub commodity_code: i32,
    pub commodity_name: String,
    pub unit_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrCountry {
    pub country_code: i32,
    pub country_name: String,
    #[serde(default)]
    pub country_description: Option<String>,
    #[serde(default)]
    pub region_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrUnit {
    pub unit_id: i32,
    pub unit_names: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrRegion {
    pub region_id: i32,
    pub region_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrRelease {
    pub commodity_code: i32,
    pub market_year: i32,
    pub release_time_stamp: String,
    pub market_year_start: String,
    pub market_year_end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsrExportRow {
    pub country_code: i32,
    pub week_ending_date: String,
    #[serde(default)]
    pub weekly_exports: Option<f64>,
    #[serde(default)]
    pub accumulated_exports: Option<f64>,
    #[serde(default)]
    pub outstanding_sales: Option<f64>,
    #[serde(default)]
    pub gross_new_sales: Option<f64>,
    #[serde(default, rename = "currentMYNetSales")]
    pub current_my_net_sales: Option<f64>,
    #[serde(default, rename = "currentMYTotalCommitment")]
    pub current_my_total_commitment: Option<f64>,
    #[serde(default, rename = "nextMYNetSales")]
    pub next_my_net_sales: Option<f64>,
    #[serde(default, rename = "nextMYOutstandingSales")]
    pub next_my_outstanding_sales: Option<f64>,
}

/// Upstream timestamps come in several shapes; try them in order.
fn parse_week_date(value: &str) -> Result<NaiveDate, CollectError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return Ok(d);
        }
    }
    Err(CollectError::BadDate {
        value: value.to_string(),
    })
}

// ==================== HTTP client ====================

/// HTTP client for the ESR API with API key rotation.
///
/// Keys rotate on HTTP 429 and when the reported `X-Ratelimit-Remaining`
/// drops below the configured threshold. Timeouts and connection errors are
/// retried with exponential backoff.
pub struct EsrClient {
    http: reqwest::Client,
    config: CollectorConfig,
    keys: Mutex<VecDeque<ApiKey>>,
}

impl EsrClient {
    pub fn new(config: CollectorConfig) -> Result<Self, CollectError> {
        if config.api_keys.is_empty() {
            return Err(CollectError::NoApiKeys);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CollectError::Http {
                endpoint: config.base_url.clone(),
                source: e,
            })?;

        let keys = config
            .api_keys
            .iter()
            .map(|k| ApiKey {
                key: k.clone(),
                rate_limit_remaining: None,
            })
            .collect();

        Ok(Self {
            http,
            config,
            keys: Mutex::new(keys),
        })
    }

    fn current_key(&self) -> String {
        let keys = self.keys.lock().unwrap();
        keys.front().expect("at least one key").key.clone()
    }

    fn rotate_key(&self) {
        let mut keys = self.keys.lock().unwrap();
        keys.rotate_left(1);
        info!("Rotated to next ESR API key");
    }

    /// Record the quota reported for the current key; rotate when it runs low.
    fn record_quota(&self, remaining: Option<i64>) {
        let rotate = {
            let mut keys = self.keys.lock().unwrap();
            if let Some(front) = keys.front_mut() {
                front.rate_limit_remaining = remaining;
            }
            remaining.is_some_and(|r| r < self.config.rate_limit_threshold)
        };
        if rotate {
            self.rotate_key();
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let millis = self.config.retry_delay.as_millis() as f64 * 1.5f64.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }

    /// GET a JSON list from the API.
    ///
    /// When `allow_empty` is false an empty body counts as a transient
    /// failure and is retried (the upstream occasionally serves empty
    /// payloads for data endpoints).
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        allow_empty: bool,
    ) -> Result<Vec<T>, CollectError> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let max_retries = self.config.max_retries;
        let mut last_empty = false;

        for attempt in 0..max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
            last_empty = false;
            info!("Request attempt {}/{} to {}", attempt + 1, max_retries, url);

            let response = self
                .http
                .get(&url)
                .header("X-Api-Key", self.current_key())
                .header("accept", "application/json")
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!("Request to {} failed on attempt {}: {}", url, attempt + 1, e);
                    continue;
                }
                Err(e) => {
                    return Err(CollectError::Http {
                        endpoint: endpoint.to_string(),
                        source: e,
                    })
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!("Rate limit hit on {}; rotating API key", url);
                self.rotate_key();
                continue;
            }

            let remaining = response
                .headers()
                .get("X-Ratelimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());

            let response = match response.error_for_status() {
                Ok(r) => r,
                Err(e) => {
                    return Err(CollectError::Http {
                        endpoint: endpoint.to_string(),
                        source: e,
                    })
                }
            };

            let body = match response.json::<Vec<T>>().await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Invalid JSON from {} on attempt {}: {}", url, attempt + 1, e);
                    continue;
                }
            };

            self.record_quota(remaining);

            if body.is_empty() && !allow_empty {
                warn!("Empty response from {} on attempt {}", url, attempt + 1);
                last_empty = true;
                continue;
            }

            return Ok(body);
        }

        if last_empty {
            return Err(CollectError::EmptyResponse {
                endpoint: endpoint.to_string(),
            });
        }
        Err(CollectError::MaxRetries {
            endpoint: endpoint.to_string(),
            attempts: max_retries,
        })
    }
}

// ==================== Collection runs ====================

/// Per-batch failure record for operator follow-up.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub commodity: CommodityCode,
    pub market_year: MarketYear,
    pub error: String,
}

/// Outcome of a collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    pub releases_checked: usize,
    pub batches_applied: usize,
    pub records_upserted: usize,
    pub failures: Vec<BatchFailure>,
}

/// Orchestrates collection runs against a repository.
pub struct Collector {
    client: EsrClient,
    repo: Arc<dyn FullRepository>,
}

impl Collector {
    pub fn new(client: EsrClient, repo: Arc<dyn FullRepository>) -> Self {
        Self { client, repo }
    }

    /// Replace the reference tables with a fresh upstream snapshot.
    pub async fn refresh_reference_data(&self) -> Result<(), CollectError> {
        info!("Updating metadata tables");

        let commodities: Vec<EsrCommodity> = self.client.get_list("/commodities", true).await?;
        let countries: Vec<EsrCountry> = self.client.get_list("/countries", true).await?;
        let units: Vec<EsrUnit> = self.client.get_list("/unitsOfMeasure", true).await?;
        let regions: Vec<EsrRegion> = self.client.get_list("/regions", true).await?;

        if commodities.is_empty() || countries.is_empty() || units.is_empty() {
            return Err(CollectError::EmptyResponse {
                endpoint: "/commodities".to_string(),
            });
        }

        self.repo
            .replace_reference_data(
                commodities
                    .into_iter()
                    .map(|c| Commodity {
                        code: CommodityCode(c.commodity_code),
                        name: c.commodity_name,
                        unit_id: c.unit_id,
                    })
                    .collect(),
                countries
                    .into_iter()
                    .map(|c| Country {
                        code: CountryCode(c.country_code),
                        name: c.country_name,
                        description: c.country_description,
                        region_id: c.region_id,
                    })
                    .collect(),
                units
                    .into_iter()
                    .map(|u| UnitOfMeasure {
                        unit_id: u.unit_id,
                        name: u.unit_names,
                    })
                    .collect(),
                regions
                    .into_iter()
                    .map(|r| Region {
                        region_id: r.region_id,
                        name: r.region_name,
                    })
                    .collect(),
            )
            .await?;

        Ok(())
    }

    /// Run a full collection pass: refresh metadata, diff release stamps,
    /// and apply one atomic batch per (commodity, marketing year) that has a
    /// newer upstream release.
    pub async fn run(&self) -> Result<CollectOutcome, CollectError> {
        self.refresh_reference_data().await?;

        let releases: Vec<EsrRelease> = self.client.get_list("/datareleasedates", false).await?;

        let existing: BTreeMap<(i32, i32), String> = self
            .repo
            .all_releases()
            .await?
            .into_iter()
            .map(|r| {
                (
                    (r.commodity.value(), r.market_year.value()),
                    r.release_timestamp,
                )
            })
            .collect();

        let updates: Vec<&EsrRelease> = releases
            .iter()
            .filter(|r| {
                existing
                    .get(&(r.commodity_code, r.market_year))
                    .map_or(true, |stored| r.release_time_stamp > *stored)
            })
            .collect();

        info!("Found {} release(s) requiring updates", updates.len());

        let mut outcome = CollectOutcome {
            releases_checked: releases.len(),
            ..Default::default()
        };

        for release in updates {
            let commodity = CommodityCode(release.commodity_code);
            let year = MarketYear(release.market_year);
            match self.collect_batch(release).await {
                Ok(count) => {
                    outcome.batches_applied += 1;
                    outcome.records_upserted += count;
                }
                Err(e) => {
                    error!(
                        "Error processing commodity {}, year {}: {}",
                        commodity, year, e
                    );
                    outcome.failures.push(BatchFailure {
                        commodity,
                        market_year: year,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Fetch and apply a single (commodity, marketing year) batch.
    async fn collect_batch(&self, release: &EsrRelease) -> Result<usize, CollectError> {
        let commodity = CommodityCode(release.commodity_code);
        let year = MarketYear(release.market_year);
        info!("Fetching data for commodity {}, year {}", commodity, year);

        let endpoint = format!(
            "/exports/commodityCode/{}/allCountries/marketYear/{}",
            commodity, year
        );
        let rows: Vec<EsrExportRow> = self.client.get_list(&endpoint, false).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let week_ending = parse_week_date(&row.week_ending_date)?;
            records.push(ExportRecord {
                commodity,
                country: CountryCode(row.country_code),
                market_year: year,
                week_ending,
                weekly_exports: row.weekly_exports.unwrap_or(0.0),
                accumulated_exports: row.accumulated_exports.unwrap_or(0.0),
                outstanding_sales: row.outstanding_sales.unwrap_or(0.0),
                gross_new_sales: row.gross_new_sales.unwrap_or(0.0),
                net_sales: row.current_my_net_sales.unwrap_or(0.0),
                total_commitments: row.current_my_total_commitment.unwrap_or(0.0),
                next_my_net_sales: row.next_my_net_sales,
                next_my_outstanding_sales: row.next_my_outstanding_sales,
            });
        }

        // Re-published weeks are overwritten last-write-wins; flag downward
        // revisions of the cumulative measure so operators can follow up.
        let stored = self.repo.fetch_series(commodity, year, year).await?;
        let previous: BTreeMap<_, f64> = stored
            .iter()
            .map(|r| (r.record.key(), r.record.accumulated_exports))
            .collect();
        for record in &records {
            if let Some(&prev) = previous.get(&record.key()) {
                if record.accumulated_exports < prev {
                    warn!(
                        "Downward revision of accumulated exports for commodity {}, country {}, MY {}, week {}: {} -> {}",
                        record.commodity,
                        record.country,
                        record.market_year,
                        record.week_ending,
                        prev,
                        record.accumulated_exports
                    );
                }
            }
        }

        let release_row = DataRelease {
            commodity,
            market_year: year,
            release_timestamp: release.release_time_stamp.clone(),
            recorded_at: Utc::now(),
            market_year_start: parse_week_date(&release.market_year_start)?,
            market_year_end: parse_week_date(&release.market_year_end)?,
        };

        let count = self.repo.apply_release_batch(release_row, records).await?;
        info!(
            "Applied {} record(s) for commodity {}, year {}",
            count, commodity, year
        );
        Ok(count)
    }
}
