diesel::table! {
    commodities (commodity_code) {
        commodity_code -> Integer,
        commodity_name -> Text,
        unit_id -> Integer,
    }
}

diesel::table! {
    countries (country_code) {
        country_code -> Integer,
        country_name -> Text,
        country_description -> Nullable<Text>,
        region_id -> Nullable<Integer>,
    }
}

diesel::table! {
    units_of_measure (unit_id) {
        unit_id -> Integer,
        unit_name -> Text,
    }
}

diesel::table! {
    regions (region_id) {
        region_id -> Integer,
        region_name -> Text,
    }
}

diesel::table! {
    export_records (commodity_code, country_code, market_year, week_ending_date) {
        commodity_code -> Integer,
        country_code -> Integer,
        market_year -> Integer,
        week_ending_date -> Date,
        weekly_exports -> Double,
        accumulated_exports -> Double,
        outstanding_sales -> Double,
        gross_new_sales -> Double,
        net_sales -> Double,
        total_commitments -> Double,
        next_my_net_sales -> Nullable<Double>,
        next_my_outstanding_sales -> Nullable<Double>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    data_releases (commodity_code, market_year) {
        commodity_code -> Integer,
        market_year -> Integer,
        release_timestamp -> Text,
        recorded_at -> Timestamp,
        market_year_start -> Date,
        market_year_end -> Date,
    }
}

diesel::joinable!(export_records -> countries (country_code));
diesel::joinable!(commodities -> units_of_measure (unit_id));

diesel::allow_tables_to_appear_in_same_query!(
    commodities,
    countries,
    data_releases,
    export_records,
    regions,
    units_of_measure,
);
