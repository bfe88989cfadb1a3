use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use salesflow_core::entities::transform_sales;
use salesflow_core::quality::{
    pass_ratio, passed_count, render_report, validate_table, CheckType,
};
use serde_json::json;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn clean_sales() -> DataFrame {
    let raw = df!(
        "sale_id" => &[1i64, 2, 3],
        "product_id" => &[101i64, 102, 101],
        "customer_id" => &[1001i64, 1002, 1003],
        "quantity" => &[2i64, 1, 5],
        "amount" => &[100.0f64, 25.5, 250.0],
        "sale_date" => &["2024-01-06", "2024-01-07", "2024-01-08"],
    )
    .unwrap();
    transform_sales(&raw, now()).expect("transform succeeded")
}

#[test]
fn unknown_tables_produce_no_results() {
    let df = df!("anything" => &[1i64, 2]).unwrap();
    assert!(validate_table(&df, "inventory", now()).is_empty());
}

#[test]
fn clean_sales_pass_every_check() {
    let results = validate_table(&clean_sales(), "sales", now());
    assert_eq!(results.len(), 6);
    assert_eq!(passed_count(&results), 6);
    assert_eq!(pass_ratio(&results), 1.0);
}

#[test]
fn missing_column_is_reported() {
    let df = clean_sales().drop("amount").unwrap();
    let results = validate_table(&df, "sales", now());

    let required = &results[&CheckType::RequiredColumns];
    assert!(!required.passed);
    assert_eq!(required.details, json!({ "missing_columns": ["amount"] }));
}

#[test]
fn null_values_are_counted_per_column() {
    let df = df!(
        "sale_id" => &[Some(1i64), None, Some(3)],
        "product_id" => &[101i64, 102, 103],
        "customer_id" => &[1i64, 2, 3],
        "quantity" => &[1i64, 1, 1],
        "amount" => &[10.0f64, 10.0, 10.0],
        "sale_date" => &["2024-01-01", "2024-01-02", "2024-01-03"],
    )
    .unwrap();
    let results = validate_table(&df, "sales", now());

    let not_null = &results[&CheckType::NotNullColumns];
    assert!(!not_null.passed);
    assert_eq!(not_null.details, json!({ "null_counts": { "sale_id": 1 } }));
}

#[test]
fn duplicates_are_counted_after_first_occurrence() {
    let df = df!(
        "product_id" => &[1i64, 1, 2],
        "product_name" => &["a", "b", "c"],
        "category" => &["x", "x", "x"],
        "price" => &[10.0f64, 20.0, 30.0],
    )
    .unwrap();
    let results = validate_table(&df, "products", now());

    let unique = &results[&CheckType::UniqueColumns];
    assert!(!unique.passed);
    assert_eq!(
        unique.details,
        json!({ "duplicate_counts": { "product_id": 1 } })
    );
}

#[test]
fn range_violations_count_both_sides() {
    let df = df!(
        "sale_id" => &[1i64, 2, 3],
        "product_id" => &[1i64, 1, 1],
        "customer_id" => &[1i64, 1, 1],
        "quantity" => &[-1i64, 5, 2000],
        "amount" => &[10.0f64, 10.0, 10.0],
        "sale_date" => &["2024-01-01", "2024-01-02", "2024-01-03"],
    )
    .unwrap();
    let results = validate_table(&df, "sales", now());

    let ranges = &results[&CheckType::NumericRanges];
    assert!(!ranges.passed);
    assert_eq!(
        ranges.details,
        json!({ "out_of_range": { "quantity": { "below_min": 1, "above_max": 1 } } })
    );
}

#[test]
fn raw_date_strings_fail_the_type_check() {
    let df = df!(
        "sale_id" => &[1i64],
        "product_id" => &[1i64],
        "customer_id" => &[1i64],
        "quantity" => &[1i64],
        "amount" => &[10.0f64],
        "sale_date" => &["2024-01-01"],
    )
    .unwrap();
    let results = validate_table(&df, "sales", now());

    let types = &results[&CheckType::DataTypes];
    assert!(!types.passed);
    assert_eq!(
        types.details,
        json!({ "issues": ["sale_date should be datetime type"] })
    );
}

#[test]
fn text_quantities_fail_the_numeric_type_check() {
    let df = df!(
        "sale_id" => &[1i64, 2],
        "product_id" => &[1i64, 1],
        "customer_id" => &[1i64, 1],
        "quantity" => &["two", "three"],
        "amount" => &[10.0f64, 15.0],
        "sale_date" => &["2024-01-01", "2024-01-02"],
    )
    .unwrap();
    let results = validate_table(&df, "sales", now());

    let types = &results[&CheckType::DataTypes];
    assert!(!types.passed);
    let issues = types.details["issues"].as_array().unwrap();
    assert!(issues.contains(&json!("quantity should be numeric type")));
    assert!(!issues.contains(&json!("amount should be numeric type")));
}

#[test]
fn sales_custom_checks_flag_zero_amounts_and_future_dates() {
    let raw = df!(
        "sale_id" => &[1i64, 2],
        "product_id" => &[1i64, 1],
        "customer_id" => &[1i64, 1],
        "quantity" => &[3i64, 1],
        "amount" => &[0.0f64, 10.0],
        "sale_date" => &["2024-01-01", "2030-01-01"],
    )
    .unwrap();
    let df = transform_sales(&raw, now()).unwrap();
    let results = validate_table(&df, "sales", now());

    let custom = &results[&CheckType::CustomChecks];
    assert!(!custom.passed);
    assert_eq!(
        custom.details,
        json!({ "issues": [
            "1 records have quantity but zero amount",
            "1 records have future sale dates"
        ] })
    );
}

#[test]
fn product_and_customer_custom_checks() {
    let products = df!(
        "product_id" => &[1i64, 2],
        "product_name" => &["a", "b"],
        "category" => &["x", "y"],
        "price" => &[0.0f64, 12.0],
    )
    .unwrap();
    let results = validate_table(&products, "products", now());
    assert_eq!(
        results[&CheckType::CustomChecks].details,
        json!({ "issues": ["1 products have zero or negative prices"] })
    );

    let customers = df!(
        "customer_id" => &[1i64, 2, 3],
        "customer_name" => &["a", "b", "c"],
        "email" => &[Some("a@company.com"), Some("broken"), None],
        "region" => &["north", "south", "east"],
    )
    .unwrap();
    let results = validate_table(&customers, "customers", now());
    assert_eq!(
        results[&CheckType::CustomChecks].details,
        json!({ "issues": ["1 customers have invalid email formats"] })
    );
    // Customers carry no numeric ranges.
    assert!(results[&CheckType::NumericRanges].passed);
}

#[test]
fn report_lists_failures_with_details() {
    let df = clean_sales().drop("amount").unwrap();
    let results = validate_table(&df, "sales", now());
    let report = render_report(&results);

    let mut lines = report.lines();
    assert_eq!(
        lines.next(),
        Some(format!("Quality Check Summary: {}/6 checks passed", passed_count(&results)).as_str())
    );
    assert!(report.contains("✓ not_null_columns: PASSED"));
    assert!(report.contains("✗ required_columns: FAILED"));
    assert!(report.contains(r#"  Details: {"missing_columns":["amount"]}"#));
}
