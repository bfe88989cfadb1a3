use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use salesflow_core::entities::{transform_customers, transform_products, transform_sales};
use salesflow_core::star_schema::{build_fact_table, build_star_schema};

fn transformed_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn sales() -> DataFrame {
    let raw = df!(
        "sale_id" => &[1i64, 2, 3, 4],
        "product_id" => &[101i64, 102, 101, 999],
        "customer_id" => &[1001i64, 1002, 1001, 1003],
        "quantity" => &[1i64, 2, 3, 4],
        "amount" => &[100.0f64, 1000.0, 1500.0, 40.0],
        "sale_date" => &["2024-01-06", "2024-01-07", "2024-01-06", "2024-01-09"],
    )
    .unwrap();
    transform_sales(&raw, transformed_at()).unwrap()
}

fn products() -> DataFrame {
    // 101 appears twice; the first row wins.
    let raw = df!(
        "product_id" => &[101i64, 102, 101],
        "product_name" => &["mouse", "lamp", "mouse v2"],
        "category" => &["electronics", "home", "toys"],
        "price" => &[25.0f64, 300.0, 30.0],
    )
    .unwrap();
    transform_products(&raw, transformed_at()).unwrap()
}

fn customers() -> DataFrame {
    let raw = df!(
        "customer_id" => &[1001i64, 1002],
        "customer_name" => &["alice", "bob"],
        "email" => &["alice@company.com", "bob@gmail.com"],
        "region" => &["north", "south"],
    )
    .unwrap();
    transform_customers(&raw, transformed_at()).unwrap()
}

#[test]
fn fact_table_keeps_one_row_per_sale() {
    let fact = build_fact_table(&sales(), &products(), &customers()).unwrap();
    assert_eq!(fact.height(), 4);

    let categories = fact.column("category").unwrap().str().unwrap();
    assert_eq!(categories.get(0), Some("ELECTRONICS"));
    assert_eq!(categories.get(1), Some("HOME"));
    assert_eq!(categories.get(2), Some("ELECTRONICS"));
    assert_eq!(categories.get(3), None);

    let tiers = fact.column("price_tier").unwrap().str().unwrap();
    assert_eq!(tiers.get(1), Some("Premium"));

    let regions = fact.column("region").unwrap().str().unwrap();
    assert_eq!(regions.get(0), Some("NORTH"));
    assert_eq!(regions.get(3), None);

    let segments = fact.column("customer_segment").unwrap().str().unwrap();
    assert_eq!(segments.get(1), Some("Personal"));
}

#[test]
fn fact_table_buckets_revenue_and_keys_dates() {
    let fact = build_fact_table(&sales(), &products(), &customers()).unwrap();

    let revenue = fact.column("revenue_category").unwrap().str().unwrap();
    assert_eq!(revenue.get(0), Some("Small"));
    assert_eq!(revenue.get(1), Some("Large"));
    assert_eq!(revenue.get(2), Some("Enterprise"));
    assert_eq!(revenue.get(3), Some("Small"));

    let date_keys = fact.column("date_key").unwrap().i32().unwrap();
    assert_eq!(date_keys.get(0), Some(20240106));
    assert_eq!(date_keys.get(3), Some(20240109));
}

#[test]
fn dimensions_carry_surrogate_keys_and_validity() {
    let effective = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let schema = build_star_schema(&sales(), &products(), &customers(), effective).unwrap();
    let dims = schema.dimensions;

    assert_eq!(dims.dim_date.height(), 3);
    let date_keys = dims.dim_date.column("date_key").unwrap().i32().unwrap();
    assert_eq!(date_keys.get(0), Some(20240106));
    assert_eq!(date_keys.get(1), Some(20240107));
    assert_eq!(date_keys.get(2), Some(20240109));
    let weekend = dims.dim_date.column("is_weekend").unwrap().bool().unwrap();
    assert_eq!(weekend.get(0), Some(true));
    assert_eq!(weekend.get(2), Some(false));
    assert_eq!(dims.dim_date.column("full_date").unwrap().dtype(), &DataType::Date);

    let product_keys = dims.dim_product.column("product_key").unwrap().i64().unwrap();
    assert_eq!(product_keys.into_iter().collect::<Vec<_>>(), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(dims.dim_product.column("end_date").unwrap().null_count(), 3);
    let current = dims.dim_product.column("is_current").unwrap().bool().unwrap();
    assert!(current.into_iter().all(|v| v == Some(true)));

    assert_eq!(dims.dim_customer.height(), 2);
    let effective_dates = dims.dim_customer.column("effective_date").unwrap();
    assert_eq!(effective_dates.dtype(), &DataType::Date);
    assert_eq!(effective_dates.null_count(), 0);

    assert_eq!(schema.fact_sales.height(), 4);
}
