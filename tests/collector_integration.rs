//! Collector integration tests against a mocked ESR API.

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use esr_dashboard::api::{CommodityCode, MarketYear};
use esr_dashboard::db::repository::{ExportRepository, ReferenceRepository};
use esr_dashboard::db::LocalRepository;
use esr_dashboard::services::{Collector, CollectorConfig, EsrClient};

fn config(base_url: String) -> CollectorConfig {
    CollectorConfig {
        base_url,
        api_keys: vec!["test-key-1".to_string(), "test-key-2".to_string()],
        rate_limit_threshold: 5,
        retry_delay: Duration::from_millis(1),
        max_retries: 3,
        request_timeout: Duration::from_secs(5),
    }
}

async fn mount_metadata(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/commodities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"commodityCode": 101, "commodityName": "Wheat", "unitId": 1},
            {"commodityCode": 401, "commodityName": "Corn", "unitId": 1}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/countries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"countryCode": 1, "countryName": "Japan"},
            {"countryCode": 2, "countryName": "Brazil", "regionId": 4}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/unitsOfMeasure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"unitId": 1, "unitNames": "Metric Tons"}
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/regions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"regionId": 4, "regionName": "South America"}
        ])))
        .mount(server)
        .await;
}

fn release_json(commodity: i32, stamp: &str) -> serde_json::Value {
    json!([{
        "commodityCode": commodity,
        "marketYear": 2023,
        "releaseTimeStamp": stamp,
        "marketYearStart": "2022-06-01",
        "marketYearEnd": "2023-05-31"
    }])
}

fn export_rows(weekly: f64, accumulated: f64) -> serde_json::Value {
    json!([
        {
            "countryCode": 1,
            "weekEndingDate": "2022-06-02T00:00:00",
            "weeklyExports": weekly,
            "accumulatedExports": accumulated,
            "outstandingSales": 300.0,
            "grossNewSales": 120.0,
            "currentMYNetSales": 110.0,
            "currentMYTotalCommitment": 1800.0
        },
        {
            "countryCode": 2,
            "weekEndingDate": "2022-06-02T00:00:00",
            "weeklyExports": 50.0,
            "accumulatedExports": 50.0,
            "outstandingSales": 10.0,
            "grossNewSales": 5.0,
            "currentMYNetSales": 4.0,
            "currentMYTotalCommitment": 60.0,
            "nextMYNetSales": 1.0,
            "nextMYOutstandingSales": 2.0
        }
    ])
}

#[tokio::test]
async fn test_collect_run_applies_batches() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;
    Mock::given(method("GET"))
        .and(path("/datareleasedates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json(101, "2023-06-01T12:00:00")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .and(header("X-Api-Key", "test-key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(export_rows(100.0, 1500.0)))
        .mount(&server)
        .await;

    let repo = Arc::new(LocalRepository::new());
    let client = EsrClient::new(config(server.uri())).unwrap();
    let collector = Collector::new(client, repo.clone());

    let outcome = collector.run().await.unwrap();
    assert_eq!(outcome.releases_checked, 1);
    assert_eq!(outcome.batches_applied, 1);
    assert_eq!(outcome.records_upserted, 2);
    assert!(outcome.failures.is_empty());

    // Reference data replaced and fact rows visible.
    let commodities = repo.list_commodities().await.unwrap();
    assert_eq!(commodities.len(), 2);
    let regions = repo.list_regions().await.unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name, "South America");
    let series = repo
        .fetch_series(CommodityCode(101), MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert_eq!(series.len(), 2);
    let japan = series
        .iter()
        .find(|r| r.country_name == "Japan")
        .unwrap();
    assert_eq!(japan.record.weekly_exports, 100.0);
    assert_eq!(japan.record.net_sales, 110.0);
    assert_eq!(japan.record.next_my_net_sales, None);

    // Second run: release timestamp unchanged, nothing to do.
    let outcome = collector.run().await.unwrap();
    assert_eq!(outcome.batches_applied, 0);
}

#[tokio::test]
async fn test_collect_retries_after_rate_limit() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;
    Mock::given(method("GET"))
        .and(path("/datareleasedates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json(101, "2023-06-01T12:00:00")))
        .mount(&server)
        .await;

    // First attempt is rate limited; the retry must arrive with the rotated
    // key and succeed.
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .and(header("X-Api-Key", "test-key-1"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .and(header("X-Api-Key", "test-key-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(export_rows(100.0, 1500.0)))
        .expect(1)
        .mount(&server)
        .await;

    let repo = Arc::new(LocalRepository::new());
    let client = EsrClient::new(config(server.uri())).unwrap();
    let collector = Collector::new(client, repo.clone());

    let outcome = collector.run().await.unwrap();
    assert_eq!(outcome.batches_applied, 1);
    assert_eq!(repo.record_count(), 2);
}

#[tokio::test]
async fn test_failed_batch_commits_nothing_for_that_commodity() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;
    Mock::given(method("GET"))
        .and(path("/datareleasedates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "commodityCode": 101,
                "marketYear": 2023,
                "releaseTimeStamp": "2023-06-01T12:00:00",
                "marketYearStart": "2022-06-01",
                "marketYearEnd": "2023-05-31"
            },
            {
                "commodityCode": 401,
                "marketYear": 2023,
                "releaseTimeStamp": "2023-06-01T12:00:00",
                "marketYearStart": "2022-09-01",
                "marketYearEnd": "2023-08-31"
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(export_rows(100.0, 1500.0)))
        .mount(&server)
        .await;
    // Corn fetch fails hard on every attempt.
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/401/allCountries/marketYear/2023"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repo = Arc::new(LocalRepository::new());
    let client = EsrClient::new(config(server.uri())).unwrap();
    let collector = Collector::new(client, repo.clone());

    let outcome = collector.run().await.unwrap();
    assert_eq!(outcome.batches_applied, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].commodity, CommodityCode(401));

    // Wheat applied in full; corn left untouched.
    assert_eq!(repo.record_count(), 2);
    let corn = repo
        .fetch_series(CommodityCode(401), MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert!(corn.is_empty());
}

#[tokio::test]
async fn test_republished_release_overwrites_last_write_wins() {
    let server = MockServer::start().await;
    mount_metadata(&server).await;

    // First publication.
    Mock::given(method("GET"))
        .and(path("/datareleasedates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json(101, "2023-06-01T12:00:00")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(export_rows(100.0, 1500.0)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let repo = Arc::new(LocalRepository::new());
    let client = EsrClient::new(config(server.uri())).unwrap();
    let collector = Collector::new(client, repo.clone());
    collector.run().await.unwrap();

    // Upstream re-publishes the same week with a corrected (lower) value.
    Mock::given(method("GET"))
        .and(path("/datareleasedates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json(101, "2023-06-02T12:00:00")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/exports/commodityCode/101/allCountries/marketYear/2023"))
        .respond_with(ResponseTemplate::new(200).set_body_json(export_rows(90.0, 1400.0)))
        .mount(&server)
        .await;

    let outcome = collector.run().await.unwrap();
    assert_eq!(outcome.batches_applied, 1);

    let series = repo
        .fetch_series(CommodityCode(101), MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    let japan = series.iter().find(|r| r.country_name == "Japan").unwrap();
    assert_eq!(japan.record.weekly_exports, 90.0);
    assert_eq!(japan.record.accumulated_exports, 1400.0);
    assert_eq!(
        japan.record.week_ending,
        NaiveDate::from_ymd_opt(2022, 6, 2).unwrap()
    );
    // Still one row per (commodity, country, year, week).
    assert_eq!(repo.record_count(), 2);
}
