use chrono::NaiveDateTime;
use polars::prelude::*;

use super::{EntityKind, EntityStrategy};
use crate::frame::{
    datetime_series, f64_values, require_columns, string_values, title_case, Bins, FrameError,
};
use crate::quality::{NumericRange, QualityRuleSet};

static PRODUCT_RULES: QualityRuleSet = QualityRuleSet {
    required_columns: &["product_id", "product_name", "category", "price"],
    not_null_columns: &["product_id", "product_name"],
    numeric_ranges: &[NumericRange {
        column: "price",
        min: Some(0.0),
        max: Some(10_000.0),
    }],
    unique_columns: &["product_id"],
};

const DESTINATION_COLUMNS: &[&str] = &["product_id", "product_name", "category", "price"];

pub const PRICE_TIERS: Bins = Bins {
    edges: &[0.0, 50.0, 200.0, 500.0, f64::INFINITY],
    labels: &["Budget", "Standard", "Premium", "Luxury"],
};

pub const UNCATEGORIZED: &str = "UNCATEGORIZED";

pub struct ProductsEntity;

impl EntityStrategy for ProductsEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Products
    }

    fn rules(&self) -> &'static QualityRuleSet {
        &PRODUCT_RULES
    }

    fn destination_columns(&self) -> &'static [&'static str] {
        DESTINATION_COLUMNS
    }

    fn transform(
        &self,
        raw: &DataFrame,
        transformed_at: NaiveDateTime,
    ) -> Result<DataFrame, FrameError> {
        transform_products(raw, transformed_at)
    }

    fn custom_issues(&self, df: &DataFrame, _now: NaiveDateTime) -> Vec<String> {
        let Ok(column) = df.column("price") else {
            return Vec::new();
        };
        let Ok(prices) = f64_values(column) else {
            return Vec::new();
        };

        let invalid = prices.iter().flatten().filter(|price| **price <= 0.0).count();
        if invalid > 0 {
            vec![format!("{invalid} products have zero or negative prices")]
        } else {
            Vec::new()
        }
    }
}

pub fn transform_products(
    raw: &DataFrame,
    transformed_at: NaiveDateTime,
) -> Result<DataFrame, FrameError> {
    require_columns(raw, &["product_name", "category", "price"])?;
    let mut df = raw.clone();

    let names: Vec<Option<String>> = string_values(df.column("product_name")?)?
        .into_iter()
        .map(|name| name.map(|n| title_case(n.trim())))
        .collect();

    let categories: Vec<String> = string_values(df.column("category")?)?
        .into_iter()
        .map(|category| match category {
            Some(value) => value.trim().to_uppercase(),
            None => UNCATEGORIZED.to_string(),
        })
        .collect();

    let tiers: Vec<Option<&str>> = f64_values(df.column("price")?)?
        .into_iter()
        .map(|price| PRICE_TIERS.label(price))
        .collect();

    let stamp = transformed_at.and_utc().timestamp_micros();
    let height = df.height();

    df.with_column(Series::new("product_name".into(), names))?;
    df.with_column(Series::new("category".into(), categories))?;
    df.with_column(Series::new("price_tier".into(), tiers))?;
    df.with_column(datetime_series("transformed_at", vec![Some(stamp); height])?)?;

    Ok(df)
}
