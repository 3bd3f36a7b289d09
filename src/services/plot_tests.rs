use super::*;
use crate::services::analyzer::CurvePoint;
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn weekly(year: i32, week: NaiveDate, value: f64) -> WeeklyPoint {
    WeeklyPoint {
        market_year: MarketYear(year),
        week_ending: week,
        value,
    }
}

#[test]
fn test_weekly_plot_one_trace_per_year() {
    let points = vec![
        weekly(2022, date(2021, 6, 3), 10.0),
        weekly(2022, date(2021, 6, 10), 15.0),
        weekly(2023, date(2022, 6, 2), 12.0),
    ];

    let spec = weekly_plot(
        &points,
        Metric::WeeklyExports,
        "Metric Tons",
        MarketYear(2022),
        MarketYear(2023),
        None,
    );

    assert_eq!(spec.data.len(), 2);
    assert_eq!(spec.data[0].name, "MY 2021/2022");
    assert_eq!(spec.data[0].trace_type, "bar");
    assert_eq!(spec.data[0].x.len(), 2);
    assert_eq!(spec.data[1].name, "MY 2022/2023");
    assert_eq!(spec.layout.barmode.as_deref(), Some("overlay"));
    assert_eq!(spec.layout.yaxis.title, "Metric Tons");
    assert!(spec.layout.title.contains("Weekly Exports"));
    assert!(spec.layout.title.contains("MY 2022-2023"));
}

#[test]
fn test_empty_points_produce_placeholder() {
    let spec = weekly_plot(
        &[],
        Metric::WeeklyExports,
        "Metric Tons",
        MarketYear(2022),
        MarketYear(2023),
        None,
    );
    assert!(spec.is_empty());
    assert_eq!(spec.layout.title, "No data available");
}

#[test]
fn test_title_suffix_lists_up_to_three_countries() {
    let few = vec!["Japan".to_string(), "Brazil".to_string()];
    assert_eq!(title_suffix(Some(&few)), " - Japan, Brazil");

    let many: Vec<String> = (0..5).map(|i| format!("Country {i}")).collect();
    assert_eq!(title_suffix(Some(&many)), " - 5 Countries");

    let sentinel = vec![ALL_COUNTRIES.to_string()];
    assert_eq!(title_suffix(Some(&sentinel)), "");
    assert_eq!(title_suffix(None), "");
}

#[test]
fn test_country_plot_stacks_sorted_traces() {
    let points = vec![
        CountryWeeklyPoint {
            market_year: MarketYear(2023),
            week_ending: date(2022, 6, 2),
            country_name: "Japan".to_string(),
            value: 12.0,
        },
        CountryWeeklyPoint {
            market_year: MarketYear(2023),
            week_ending: date(2022, 6, 2),
            country_name: "Brazil".to_string(),
            value: 8.0,
        },
    ];

    let spec = country_plot(
        &points,
        Metric::WeeklyExports,
        "Metric Tons",
        MarketYear(2023),
        MarketYear(2023),
        None,
    );

    assert_eq!(spec.data.len(), 2);
    assert_eq!(spec.data[0].name, "Brazil");
    assert_eq!(spec.data[1].name, "Japan");
    assert_eq!(spec.layout.barmode.as_deref(), Some("stack"));
}

#[test]
fn test_my_comparison_plot_lines_with_gaps() {
    let curves = vec![YearCurve {
        market_year: MarketYear(2023),
        start_date: Some(date(2022, 6, 1)),
        points: vec![
            CurvePoint {
                week: 1,
                value: Some(20.0),
            },
            CurvePoint { week: 2, value: None },
            CurvePoint {
                week: 3,
                value: Some(5.0),
            },
        ],
    }];

    let spec = my_comparison_plot(&curves, Metric::NetSales, "Metric Tons", None);

    assert_eq!(spec.data.len(), 1);
    assert_eq!(spec.data[0].mode.as_deref(), Some("lines"));
    assert_eq!(spec.data[0].name, "MY 2022/2023 (Start: Jun 01)");
    assert_eq!(spec.data[0].y, vec![Some(20.0), None, Some(5.0)]);
    assert_eq!(spec.layout.xaxis.dtick, Some(4.0));
    assert!(spec.layout.title.contains("Marketing Year Comparison"));
}

#[test]
fn test_plot_spec_serializes_plotly_shape() {
    let points = vec![weekly(2023, date(2022, 6, 2), 12.0)];
    let spec = weekly_plot(
        &points,
        Metric::WeeklyExports,
        "Metric Tons",
        MarketYear(2023),
        MarketYear(2023),
        None,
    );

    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["data"][0]["type"], "bar");
    assert_eq!(json["data"][0]["x"][0], "2022-06-02");
    assert_eq!(json["layout"]["template"], "plotly_white");
    // Absent options are omitted, not null.
    assert!(json["data"][0].get("mode").is_none());
}
