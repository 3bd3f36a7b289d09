//! Property tests for the repository and analyzer invariants.

use chrono::{Days, NaiveDate, Utc};
use proptest::prelude::*;
use std::sync::Arc;

use esr_dashboard::api::{CommodityCode, CountryCode, MarketYear};
use esr_dashboard::db::models::{Commodity, Country, DataRelease, ExportRecord, UnitOfMeasure};
use esr_dashboard::db::repository::ExportRepository;
use esr_dashboard::db::LocalRepository;
use esr_dashboard::services::analyzer;

const WHEAT: CommodityCode = CommodityCode(101);

fn my_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 6, 1).unwrap()
}

fn seeded_repo() -> Arc<LocalRepository> {
    let repo = Arc::new(LocalRepository::new());
    repo.seed_reference(
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
                description: None,
                region_id: None,
            },
        ],
        vec![UnitOfMeasure {
            unit_id: 1,
            name: "Metric Tons".to_string(),
        }],
    );
    repo
}

fn release(year: i32) -> DataRelease {
    DataRelease {
        commodity: WHEAT,
        market_year: MarketYear(year),
        release_timestamp: format!("{}-06-01T00:00:00", year),
        recorded_at: Utc::now(),
        market_year_start: my_start(),
        market_year_end: my_start() + Days::new(364),
    }
}

fn record(country: i32, week_offset: u64, weekly: f64) -> ExportRecord {
    let week_ending = my_start() + Days::new(1 + 7 * week_offset);
    ExportRecord {
        commodity: WHEAT,
        country: CountryCode(country),
        market_year: MarketYear(2023),
        week_ending,
        weekly_exports: weekly,
        accumulated_exports: weekly,
        outstanding_sales: 0.0,
        gross_new_sales: 0.0,
        net_sales: 0.0,
        total_commitments: weekly,
        next_my_net_sales: None,
        next_my_outstanding_sales: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Applying the same batch twice leaves the table state unchanged.
    #[test]
    fn upsert_is_idempotent(
        entries in prop::collection::vec((1..3i32, 0u64..52, 0.0f64..1000.0), 1..40)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = seeded_repo();
            let records: Vec<ExportRecord> = entries
                .iter()
                .map(|(country, week, weekly)| record(*country, *week, *weekly))
                .collect();

            repo.apply_release_batch(release(2023), records.clone())
                .await
                .unwrap();
            let first = repo
                .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
                .await
                .unwrap();

            repo.apply_release_batch(release(2023), records).await.unwrap();
            let second = repo
                .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
                .await
                .unwrap();

            prop_assert_eq!(first, second);
            Ok(())
        })?;
    }

    /// The years listing is strictly ascending with no duplicates, whatever
    /// the set of stored releases.
    #[test]
    fn years_strictly_ascending(
        year_set in prop::collection::btree_set(2000i32..2040, 1..12)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = seeded_repo();
            for year in &year_set {
                repo.seed_release(release(*year));
            }

            let years = analyzer::years(repo.as_ref(), WHEAT).await.unwrap();
            prop_assert!(years.windows(2).all(|w| w[0] < w[1]));
            // Every stored year is present, plus the synthesized next year.
            prop_assert_eq!(years.len(), year_set.len() + 1);
            Ok(())
        })?;
    }

    /// Series rows keep their country-then-week ordering for any insert order.
    #[test]
    fn fetch_series_is_ordered(
        entries in prop::collection::vec((1..3i32, 0u64..52, 0.0f64..1000.0), 1..40)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let repo = seeded_repo();
            let records: Vec<ExportRecord> = entries
                .iter()
                .map(|(country, week, weekly)| record(*country, *week, *weekly))
                .collect();
            repo.seed_records(records);

            let series = repo
                .fetch_series(WHEAT, MarketYear(2023), MarketYear(2023))
                .await
                .unwrap();
            let is_sorted = series.windows(2).all(|w| {
                (w[0].country_name.as_str(), w[0].record.week_ending)
                    <= (w[1].country_name.as_str(), w[1].record.week_ending)
            });
            prop_assert!(is_sorted);
            Ok(())
        })?;
    }
}
