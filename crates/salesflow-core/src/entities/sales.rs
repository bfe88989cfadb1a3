use chrono::{Datelike, NaiveDateTime};
use polars::prelude::*;

use super::{EntityKind, EntityStrategy};
use crate::frame::{
    datetime_micros, datetime_series, f64_values, i64_values, is_integer_dtype, is_numeric_dtype,
    is_temporal_dtype, micros_to_naive, require_columns, round_to, FrameError,
};
use crate::quality::{NumericRange, QualityRuleSet};

static SALES_RULES: QualityRuleSet = QualityRuleSet {
    required_columns: &[
        "sale_id",
        "product_id",
        "customer_id",
        "quantity",
        "amount",
        "sale_date",
    ],
    not_null_columns: &["sale_id", "product_id", "customer_id", "sale_date"],
    numeric_ranges: &[
        NumericRange {
            column: "quantity",
            min: Some(0.0),
            max: Some(1000.0),
        },
        NumericRange {
            column: "amount",
            min: Some(0.0),
            max: Some(1_000_000.0),
        },
    ],
    unique_columns: &["sale_id"],
};

const DESTINATION_COLUMNS: &[&str] = &[
    "sale_id",
    "product_id",
    "customer_id",
    "quantity",
    "amount",
    "sale_date",
];

const NUMERIC_COLUMNS: [&str; 3] = ["quantity", "amount", "price_per_unit"];

pub struct SalesEntity;

impl EntityStrategy for SalesEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Sales
    }

    fn rules(&self) -> &'static QualityRuleSet {
        &SALES_RULES
    }

    fn destination_columns(&self) -> &'static [&'static str] {
        DESTINATION_COLUMNS
    }

    fn transform(
        &self,
        raw: &DataFrame,
        transformed_at: NaiveDateTime,
    ) -> Result<DataFrame, FrameError> {
        transform_sales(raw, transformed_at)
    }

    fn type_issues(&self, df: &DataFrame) -> Vec<String> {
        let mut issues = Vec::new();

        if let Ok(column) = df.column("sale_date") {
            if !is_temporal_dtype(column.dtype()) {
                issues.push("sale_date should be datetime type".to_string());
            }
        }

        for name in NUMERIC_COLUMNS {
            if let Ok(column) = df.column(name) {
                if !is_numeric_dtype(column.dtype()) {
                    issues.push(format!("{name} should be numeric type"));
                }
            }
        }

        issues
    }

    fn custom_issues(&self, df: &DataFrame, now: NaiveDateTime) -> Vec<String> {
        let mut issues = Vec::new();

        if let (Ok(quantity), Ok(amount)) = (df.column("quantity"), df.column("amount")) {
            if let (Ok(quantity), Ok(amount)) = (f64_values(quantity), f64_values(amount)) {
                let zero_amount = quantity
                    .iter()
                    .zip(amount.iter())
                    .filter(|(q, a)| matches!((q, a), (Some(q), Some(a)) if *q > 0.0 && *a == 0.0))
                    .count();
                if zero_amount > 0 {
                    issues.push(format!(
                        "{zero_amount} records have quantity but zero amount"
                    ));
                }
            }
        }

        if let Ok(column) = df.column("sale_date") {
            if let Ok(values) = datetime_micros(column, false) {
                let now_micros = now.and_utc().timestamp_micros();
                let future = values.iter().flatten().filter(|v| **v > now_micros).count();
                if future > 0 {
                    issues.push(format!("{future} records have future sale dates"));
                }
            }
        }

        issues
    }
}

/// Parses `sale_date`, derives calendar parts and `price_per_unit`, and rounds money columns.
///
/// `price_per_unit` is computed before missing quantities and amounts are filled with zero,
/// so a missing input leaves it null. A zero quantity yields an infinite or NaN value.
pub fn transform_sales(
    raw: &DataFrame,
    transformed_at: NaiveDateTime,
) -> Result<DataFrame, FrameError> {
    require_columns(raw, &["sale_date", "quantity", "amount"])?;
    let mut df = raw.clone();
    let height = df.height();

    let sale_micros = datetime_micros(df.column("sale_date")?, true)?;
    let sale_dates: Vec<Option<NaiveDateTime>> = sale_micros
        .iter()
        .map(|value| value.and_then(micros_to_naive))
        .collect();

    let mut years = Vec::with_capacity(height);
    let mut months = Vec::with_capacity(height);
    let mut quarters = Vec::with_capacity(height);
    let mut days_of_week = Vec::with_capacity(height);
    let mut weekends = Vec::with_capacity(height);

    for date in &sale_dates {
        match date {
            Some(date) => {
                let month = date.month() as i32;
                let day_of_week = date.weekday().num_days_from_monday() as i32;
                years.push(Some(date.year()));
                months.push(Some(month));
                quarters.push(Some((month - 1) / 3 + 1));
                days_of_week.push(Some(day_of_week));
                weekends.push(day_of_week >= 5);
            }
            None => {
                years.push(None);
                months.push(None);
                quarters.push(None);
                days_of_week.push(None);
                weekends.push(false);
            }
        }
    }

    let quantity_column = df.column("quantity")?.clone();
    let quantities = f64_values(&quantity_column)?;
    let amounts = f64_values(df.column("amount")?)?;

    let price_per_unit: Vec<Option<f64>> = amounts
        .iter()
        .zip(quantities.iter())
        .map(|(amount, quantity)| match (amount, quantity) {
            (Some(amount), Some(quantity)) => Some(round_to(amount / quantity, 2)),
            _ => None,
        })
        .collect();

    let rounded_amounts: Vec<f64> = amounts
        .iter()
        .map(|amount| amount.map_or(0.0, |v| round_to(v, 2)))
        .collect();

    let filled_quantity = if is_integer_dtype(quantity_column.dtype()) {
        let values: Vec<i64> = i64_values(&quantity_column)?
            .into_iter()
            .map(|v| v.unwrap_or(0))
            .collect();
        Series::new("quantity".into(), values)
    } else {
        let values: Vec<f64> = quantities.iter().map(|v| v.unwrap_or(0.0)).collect();
        Series::new("quantity".into(), values)
    };

    let stamp = transformed_at.and_utc().timestamp_micros();

    df.with_column(datetime_series("sale_date", sale_micros)?)?;
    df.with_column(Series::new("year".into(), years))?;
    df.with_column(Series::new("month".into(), months))?;
    df.with_column(Series::new("quarter".into(), quarters))?;
    df.with_column(Series::new("day_of_week".into(), days_of_week))?;
    df.with_column(Series::new("is_weekend".into(), weekends))?;
    df.with_column(Series::new("price_per_unit".into(), price_per_unit))?;
    df.with_column(Series::new("amount".into(), rounded_amounts))?;
    df.with_column(filled_quantity)?;
    df.with_column(datetime_series("transformed_at", vec![Some(stamp); height])?)?;

    Ok(df)
}
