use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::frame::{
    date_series, date_to_days, datetime_micros, f64_values, micros_to_naive, require_columns,
    string_values, value_key, Bins, FrameError,
};

pub const REVENUE_CATEGORIES: Bins = Bins {
    edges: &[0.0, 100.0, 500.0, 1000.0, f64::INFINITY],
    labels: &["Small", "Medium", "Large", "Enterprise"],
};

const PRODUCT_ATTRIBUTES: [&str; 2] = ["category", "price_tier"];
const CUSTOMER_ATTRIBUTES: [&str; 2] = ["region", "customer_segment"];

#[derive(Debug, Clone)]
pub struct DimensionTables {
    pub dim_date: DataFrame,
    pub dim_product: DataFrame,
    pub dim_customer: DataFrame,
}

#[derive(Debug, Clone)]
pub struct StarSchema {
    pub fact_sales: DataFrame,
    pub dimensions: DimensionTables,
}

pub fn build_star_schema(
    sales: &DataFrame,
    products: &DataFrame,
    customers: &DataFrame,
    effective_date: NaiveDate,
) -> Result<StarSchema, FrameError> {
    Ok(StarSchema {
        fact_sales: build_fact_table(sales, products, customers)?,
        dimensions: build_dimension_tables(sales, products, customers, effective_date)?,
    })
}

/// Left-joins enriched sales to product and customer attributes.
///
/// The output has exactly one row per sales row. When a dimension key repeats, the first
/// occurrence wins; unmatched keys leave the joined attributes null.
pub fn build_fact_table(
    sales: &DataFrame,
    products: &DataFrame,
    customers: &DataFrame,
) -> Result<DataFrame, FrameError> {
    require_columns(sales, &["product_id", "customer_id", "amount", "sale_date"])?;
    require_columns(products, &["product_id", "category", "price_tier"])?;
    require_columns(customers, &["customer_id", "region", "customer_segment"])?;

    let mut fact = sales.clone();

    let product_rows = lookup_rows(sales, "product_id", products)?;
    for attribute in PRODUCT_ATTRIBUTES {
        fact.with_column(gather_text(products, attribute, &product_rows)?)?;
    }

    let customer_rows = lookup_rows(sales, "customer_id", customers)?;
    for attribute in CUSTOMER_ATTRIBUTES {
        fact.with_column(gather_text(customers, attribute, &customer_rows)?)?;
    }

    let revenue: Vec<Option<&str>> = f64_values(fact.column("amount")?)?
        .into_iter()
        .map(|amount| REVENUE_CATEGORIES.label(amount))
        .collect();
    fact.with_column(Series::new("revenue_category".into(), revenue))?;

    let date_keys: Vec<Option<i32>> = sale_dates(&fact)?
        .into_iter()
        .map(|date| date.map(date_key))
        .collect();
    fact.with_column(Series::new("date_key".into(), date_keys))?;

    Ok(fact)
}

pub fn build_dimension_tables(
    sales: &DataFrame,
    products: &DataFrame,
    customers: &DataFrame,
    effective_date: NaiveDate,
) -> Result<DimensionTables, FrameError> {
    Ok(DimensionTables {
        dim_date: build_date_dimension(sales)?,
        dim_product: stamp_dimension(products, "product_key", effective_date)?,
        dim_customer: stamp_dimension(customers, "customer_key", effective_date)?,
    })
}

/// One row per distinct sale date, in first-seen order.
pub fn build_date_dimension(sales: &DataFrame) -> Result<DataFrame, FrameError> {
    require_columns(sales, &["sale_date"])?;

    let mut seen = HashSet::new();
    let dates: Vec<NaiveDate> = sale_dates(sales)?
        .into_iter()
        .flatten()
        .filter(|date| seen.insert(*date))
        .collect();

    let date_keys: Vec<i32> = dates.iter().map(|d| date_key(*d)).collect();
    let full_dates: Vec<Option<i32>> = dates.iter().map(|d| Some(date_to_days(*d))).collect();
    let years: Vec<i32> = dates.iter().map(|d| d.year()).collect();
    let quarters: Vec<i32> = dates.iter().map(|d| (d.month() as i32 - 1) / 3 + 1).collect();
    let months: Vec<i32> = dates.iter().map(|d| d.month() as i32).collect();
    let days: Vec<i32> = dates.iter().map(|d| d.day() as i32).collect();
    let days_of_week: Vec<i32> = dates
        .iter()
        .map(|d| d.weekday().num_days_from_monday() as i32)
        .collect();
    let weekends: Vec<bool> = days_of_week.iter().map(|d| *d >= 5).collect();

    Ok(DataFrame::new(vec![
        Series::new("date_key".into(), date_keys).into(),
        date_series("full_date", full_dates)?.into(),
        Series::new("year".into(), years).into(),
        Series::new("quarter".into(), quarters).into(),
        Series::new("month".into(), months).into(),
        Series::new("day".into(), days).into(),
        Series::new("day_of_week".into(), days_of_week).into(),
        Series::new("is_weekend".into(), weekends).into(),
    ])?)
}

/// Copies a dimension source and adds a 1..N surrogate key plus one-shot validity columns.
pub fn stamp_dimension(
    source: &DataFrame,
    key_column: &str,
    effective_date: NaiveDate,
) -> Result<DataFrame, FrameError> {
    let height = source.height();
    let mut dimension = source.clone();

    let keys: Vec<i64> = (1..=height as i64).collect();
    let effective = Some(date_to_days(effective_date));

    dimension.with_column(Series::new(key_column.into(), keys))?;
    dimension.with_column(date_series("effective_date", vec![effective; height])?)?;
    dimension.with_column(date_series("end_date", vec![None; height])?)?;
    dimension.with_column(Series::new("is_current".into(), vec![true; height]))?;

    Ok(dimension)
}

pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

fn sale_dates(df: &DataFrame) -> Result<Vec<Option<NaiveDate>>, FrameError> {
    Ok(datetime_micros(df.column("sale_date")?, true)?
        .into_iter()
        .map(|micros| micros.and_then(micros_to_naive).map(|dt| dt.date()))
        .collect())
}

/// For every row of `left`, the index of the first `right` row with the same key.
fn lookup_rows(
    left: &DataFrame,
    key: &str,
    right: &DataFrame,
) -> Result<Vec<Option<usize>>, FrameError> {
    let right_keys = right.column(key)?;
    let mut index: HashMap<String, usize> = HashMap::with_capacity(right_keys.len());
    for idx in 0..right_keys.len() {
        if let Some(value) = value_key(&right_keys.get(idx)?) {
            index.entry(value).or_insert(idx);
        }
    }

    let left_keys = left.column(key)?;
    let mut rows = Vec::with_capacity(left_keys.len());
    for idx in 0..left_keys.len() {
        let row = value_key(&left_keys.get(idx)?).and_then(|value| index.get(&value).copied());
        rows.push(row);
    }
    Ok(rows)
}

fn gather_text(
    source: &DataFrame,
    column: &str,
    rows: &[Option<usize>],
) -> Result<Series, FrameError> {
    let values = string_values(source.column(column)?)?;
    let gathered: Vec<Option<String>> = rows
        .iter()
        .map(|row| row.and_then(|idx| values.get(idx).cloned().flatten()))
        .collect();
    Ok(Series::new(column.into(), gathered))
}
