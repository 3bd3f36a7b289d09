//! SQLite backend integration tests.
//!
//! Run with `cargo test --features sqlite-repo`. Each test gets its own
//! database file in a temporary directory; migrations run on open.

#![cfg(feature = "sqlite-repo")]

use chrono::{NaiveDate, Utc};
use tempfile::TempDir;

use esr_dashboard::api::{CommodityCode, CountryCode, MarketYear};
use esr_dashboard::db::models::{Commodity, Country, DataRelease, ExportRecord, UnitOfMeasure};
use esr_dashboard::db::repository::{ExportRepository, ReferenceRepository, ReleaseRepository};
use esr_dashboard::db::{SqliteConfig, SqliteRepository};

const WHEAT: CommodityCode = CommodityCode(101);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn open_repo(dir: &TempDir) -> SqliteRepository {
    let path = dir.path().join("esr_test.db");
    SqliteRepository::new(SqliteConfig::with_path(path.display().to_string())).unwrap()
}

async fn seed_reference(repo: &SqliteRepository) {
    repo.replace_reference_data(
        vec![Commodity {
            code: WHEAT,
            name: "Wheat".to_string(),
            unit_id: 1,
        }],
        vec![
            Country {
                code: CountryCode(1),
                name: "Japan".to_string(),
                description: None,
                region_id: None,
            },
            Country {
                code: CountryCode(2),
                name: "Brazil".to_string(),
                description: Some("BR".to_string()),
                region_id: Some(4),
            },
        ],
        vec![UnitOfMeasure {
            unit_id: 1,
            name: "Metric Tons".to_string(),
        }],
        vec![],
    )
    .await
    .unwrap();
}

fn record(country: i32, week: NaiveDate, weekly: f64) -> ExportRecord {
    ExportRecord {
        commodity: WHEAT,
        country: CountryCode(country),
        market_year: MarketYear(2023),
        week_ending: week,
        weekly_exports: weekly,
        accumulated_exports: weekly,
        outstanding_sales: 10.0,
        gross_new_sales: 5.0,
        net_sales: 4.0,
        total_commitments: weekly + 10.0,
        next_my_net_sales: None,
        next_my_outstanding_sales: None,
    }
}

fn release() -> DataRelease {
    DataRelease {
        commodity: WHEAT,
        market_year: MarketYear(2023),
        release_timestamp: "2023-06-01T12:00:00".to_string(),
        recorded_at: Utc::now(),
        market_year_start: date(2022, 6, 1),
        market_year_end: date(2023, 5, 31),
    }
}

#[tokio::test]
async fn test_migrations_and_health() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    assert!(repo.health_check().await.unwrap());
}

#[tokio::test]
async fn test_reference_data_roundtrip() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    seed_reference(&repo).await;

    let info = repo.get_commodity_info(WHEAT).await.unwrap();
    assert_eq!(info.commodity_name, "Wheat");
    assert_eq!(info.unit_name, "Metric Tons");

    let countries = repo.list_countries().await.unwrap();
    assert_eq!(countries.len(), 2);
    assert_eq!(countries[0].name, "Brazil");

    let err = repo.get_commodity_info(CommodityCode(999)).await.unwrap_err();
    assert!(err.is_not_found());

    // A second refresh replaces, not appends.
    seed_reference(&repo).await;
    assert_eq!(repo.list_commodities().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_apply_release_batch_upserts() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    seed_reference(&repo).await;

    let records = vec![
        record(1, date(2022, 6, 2), 12.0),
        record(2, date(2022, 6, 2), 8.0),
    ];
    let count = repo
        .apply_release_batch(release(), records.clone())
        .await
        .unwrap();
    assert_eq!(count, 2);

    let first = repo
        .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert_eq!(first.len(), 2);
    // Ordered by country name: Brazil before Japan.
    assert_eq!(first[0].country_name, "Brazil");
    assert_eq!(first[1].country_name, "Japan");

    // Idempotent re-apply.
    repo.apply_release_batch(release(), records).await.unwrap();
    let second = repo
        .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert_eq!(first, second);

    // Last-write-wins on a revised value.
    repo.apply_release_batch(release(), vec![record(1, date(2022, 6, 2), 99.0)])
        .await
        .unwrap();
    let revised = repo
        .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert_eq!(revised.len(), 2);
    let japan = revised.iter().find(|r| r.country_name == "Japan").unwrap();
    assert_eq!(japan.record.weekly_exports, 99.0);
}

#[tokio::test]
async fn test_week_queries() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    seed_reference(&repo).await;
    repo.apply_release_batch(
        release(),
        vec![
            record(1, date(2022, 6, 2), 12.0),
            record(1, date(2022, 6, 9), 6.0),
            record(2, date(2022, 6, 9), 14.0),
        ],
    )
    .await
    .unwrap();

    let weeks = repo.latest_weeks(WHEAT, 2).await.unwrap();
    assert_eq!(weeks, vec![date(2022, 6, 9), date(2022, 6, 2)]);

    let latest = repo
        .fetch_records_for_week(WHEAT, date(2022, 6, 9))
        .await
        .unwrap();
    assert_eq!(latest.len(), 2);

    let activity = repo
        .countries_with_data(WHEAT, MarketYear(2023), MarketYear(2023))
        .await
        .unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].country_name, "Brazil");
    assert_eq!(activity[0].total_weekly_exports, 14.0);
    assert_eq!(activity[1].total_weekly_exports, 18.0);
}

#[tokio::test]
async fn test_release_bookkeeping() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir);
    seed_reference(&repo).await;
    repo.apply_release_batch(release(), vec![record(1, date(2022, 6, 2), 12.0)])
        .await
        .unwrap();

    let releases = repo.get_releases(WHEAT).await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].market_year, MarketYear(2023));
    assert_eq!(releases[0].market_year_start, date(2022, 6, 1));

    // Re-applying with a newer stamp overwrites the bookkeeping row.
    let mut newer = release();
    newer.release_timestamp = "2023-06-08T12:00:00".to_string();
    repo.apply_release_batch(newer, vec![]).await.unwrap();
    let releases = repo.all_releases().await.unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].release_timestamp, "2023-06-08T12:00:00");
}
