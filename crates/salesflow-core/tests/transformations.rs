use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use salesflow_core::entities::{
    categorize_customer, transform_customers, transform_products, transform_sales, PRICE_TIERS,
};
use salesflow_core::frame::FrameError;

fn transformed_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap()
}

#[test]
fn sales_derive_calendar_parts_and_unit_price() {
    let raw = df!(
        "sale_id" => &[1i64, 2],
        "product_id" => &[101i64, 102],
        "customer_id" => &[1001i64, 1002],
        "quantity" => &[2i64, 3],
        "amount" => &[100.0f64, 10.0],
        "sale_date" => &["2024-01-06", "2024-01-08"],
    )
    .unwrap();
    let df = transform_sales(&raw, transformed_at()).expect("transform succeeded");

    let unit_price = df.column("price_per_unit").unwrap().f64().unwrap();
    assert_eq!(unit_price.get(0), Some(50.0));
    assert_eq!(unit_price.get(1), Some(3.33));

    // 2024-01-06 is a Saturday, 2024-01-08 a Monday.
    let weekend = df.column("is_weekend").unwrap().bool().unwrap();
    assert_eq!(weekend.get(0), Some(true));
    assert_eq!(weekend.get(1), Some(false));

    let day_of_week = df.column("day_of_week").unwrap().i32().unwrap();
    assert_eq!(day_of_week.get(0), Some(5));
    assert_eq!(day_of_week.get(1), Some(0));

    assert_eq!(df.column("year").unwrap().i32().unwrap().get(0), Some(2024));
    assert_eq!(df.column("month").unwrap().i32().unwrap().get(0), Some(1));
    assert_eq!(df.column("quarter").unwrap().i32().unwrap().get(0), Some(1));
    assert!(matches!(
        df.column("sale_date").unwrap().dtype(),
        DataType::Datetime(_, _)
    ));
    assert!(matches!(
        df.column("transformed_at").unwrap().dtype(),
        DataType::Datetime(_, _)
    ));
}

#[test]
fn sales_fill_missing_money_after_unit_price() {
    let raw = df!(
        "sale_id" => &[1i64, 2],
        "product_id" => &[1i64, 1],
        "customer_id" => &[1i64, 1],
        "quantity" => &[Some(2i64), None],
        "amount" => &[None, Some(12.346f64)],
        "sale_date" => &["2024-02-01", "2024-02-02"],
    )
    .unwrap();
    let df = transform_sales(&raw, transformed_at()).unwrap();

    let unit_price = df.column("price_per_unit").unwrap().f64().unwrap();
    assert_eq!(unit_price.get(0), None);
    assert_eq!(unit_price.get(1), None);

    let amount = df.column("amount").unwrap().f64().unwrap();
    assert_eq!(amount.get(0), Some(0.0));
    assert_eq!(amount.get(1), Some(12.35));

    let quantity = df.column("quantity").unwrap().i64().unwrap();
    assert_eq!(quantity.get(1), Some(0));
}

#[test]
fn unparseable_sale_date_fails_the_transform() {
    let raw = df!(
        "quantity" => &[1i64],
        "amount" => &[1.0f64],
        "sale_date" => &["not a date"],
    )
    .unwrap();
    let err = transform_sales(&raw, transformed_at()).unwrap_err();
    assert!(matches!(err, FrameError::UnparseableDate { .. }));
}

#[test]
fn price_tier_edges_belong_to_the_lower_bucket() {
    assert_eq!(PRICE_TIERS.label(Some(49.99)), Some("Budget"));
    assert_eq!(PRICE_TIERS.label(Some(50.0)), Some("Budget"));
    assert_eq!(PRICE_TIERS.label(Some(50.01)), Some("Standard"));
    assert_eq!(PRICE_TIERS.label(Some(200.0)), Some("Standard"));
    assert_eq!(PRICE_TIERS.label(Some(500.0)), Some("Premium"));
    assert_eq!(PRICE_TIERS.label(Some(500.01)), Some("Luxury"));
    assert_eq!(PRICE_TIERS.label(Some(0.0)), None);
    assert_eq!(PRICE_TIERS.label(Some(-5.0)), None);
}

#[test]
fn products_are_normalised_and_tiered() {
    let raw = df!(
        "product_id" => &[1i64, 2, 3],
        "product_name" => &["  wireless MOUSE ", "desk lamp", "oak table"],
        "category" => &[Some(" electronics"), None, Some("furniture ")],
        "price" => &[50.0f64, 120.0, 899.0],
    )
    .unwrap();
    let df = transform_products(&raw, transformed_at()).unwrap();

    let names = df.column("product_name").unwrap().str().unwrap();
    assert_eq!(names.get(0), Some("Wireless Mouse"));

    let categories = df.column("category").unwrap().str().unwrap();
    assert_eq!(categories.get(0), Some("ELECTRONICS"));
    assert_eq!(categories.get(1), Some("UNCATEGORIZED"));
    assert_eq!(categories.get(2), Some("FURNITURE"));

    let tiers = df.column("price_tier").unwrap().str().unwrap();
    assert_eq!(tiers.get(0), Some("Budget"));
    assert_eq!(tiers.get(1), Some("Standard"));
    assert_eq!(tiers.get(2), Some("Luxury"));
}

#[test]
fn customers_are_normalised_and_segmented() {
    let raw = df!(
        "customer_id" => &[1i64, 2, 3, 4],
        "customer_name" => &["  alice SMITH ", "bob", "carol", "dan"],
        "email" => &[
            Some(" Alice@Company.com "),
            Some("bob@gmail.com"),
            Some("carol@other.org"),
            None,
        ],
        "region" => &[Some(" north "), None, Some("west"), Some("east")],
    )
    .unwrap();
    let df = transform_customers(&raw, transformed_at()).unwrap();

    let names = df.column("customer_name").unwrap().str().unwrap();
    assert_eq!(names.get(0), Some("Alice Smith"));

    let emails = df.column("email").unwrap().str().unwrap();
    assert_eq!(emails.get(0), Some("alice@company.com"));
    assert_eq!(emails.get(3), None);

    let regions = df.column("region").unwrap().str().unwrap();
    assert_eq!(regions.get(0), Some("NORTH"));
    assert_eq!(regions.get(1), Some("UNKNOWN"));

    let domains = df.column("email_domain").unwrap().str().unwrap();
    assert_eq!(domains.get(0), Some("company.com"));
    assert_eq!(domains.get(3), None);

    let segments = df.column("customer_segment").unwrap().str().unwrap();
    assert_eq!(segments.get(0), Some("Corporate"));
    assert_eq!(segments.get(1), Some("Personal"));
    assert_eq!(segments.get(2), Some("Other"));
    assert_eq!(segments.get(3), Some("Unknown"));
}

#[test]
fn segment_lookup_handles_empty_domains() {
    assert_eq!(categorize_customer(Some("corp.com")), "Corporate");
    assert_eq!(categorize_customer(Some("outlook.com")), "Personal");
    assert_eq!(categorize_customer(Some("")), "Unknown");
    assert_eq!(categorize_customer(None), "Unknown");
}
