use chrono::NaiveDateTime;
use polars::prelude::*;

use super::{EntityKind, EntityStrategy};
use crate::frame::{datetime_series, require_columns, string_values, title_case, FrameError};
use crate::quality::QualityRuleSet;

static CUSTOMER_RULES: QualityRuleSet = QualityRuleSet {
    required_columns: &["customer_id", "customer_name", "email", "region"],
    not_null_columns: &["customer_id", "customer_name"],
    numeric_ranges: &[],
    unique_columns: &["customer_id", "email"],
};

const DESTINATION_COLUMNS: &[&str] = &["customer_id", "customer_name", "email", "region"];

const CORPORATE_DOMAINS: [&str; 3] = ["company.com", "business.com", "corp.com"];
const PERSONAL_DOMAINS: [&str; 4] = ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

pub const UNKNOWN_REGION: &str = "UNKNOWN";

pub struct CustomersEntity;

impl EntityStrategy for CustomersEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Customers
    }

    fn rules(&self) -> &'static QualityRuleSet {
        &CUSTOMER_RULES
    }

    fn destination_columns(&self) -> &'static [&'static str] {
        DESTINATION_COLUMNS
    }

    fn transform(
        &self,
        raw: &DataFrame,
        transformed_at: NaiveDateTime,
    ) -> Result<DataFrame, FrameError> {
        transform_customers(raw, transformed_at)
    }

    fn custom_issues(&self, df: &DataFrame, _now: NaiveDateTime) -> Vec<String> {
        let Ok(column) = df.column("email") else {
            return Vec::new();
        };
        let Ok(emails) = string_values(column) else {
            return Vec::new();
        };

        // Missing emails are left to the not-null rules.
        let invalid = emails
            .iter()
            .flatten()
            .filter(|email| !email.contains('@'))
            .count();
        if invalid > 0 {
            vec![format!("{invalid} customers have invalid email formats")]
        } else {
            Vec::new()
        }
    }
}

/// Segment for an email domain: Corporate, Personal, Other, or Unknown when empty or missing.
pub fn categorize_customer(email_domain: Option<&str>) -> &'static str {
    match email_domain {
        None | Some("") => "Unknown",
        Some(domain) if CORPORATE_DOMAINS.contains(&domain) => "Corporate",
        Some(domain) if PERSONAL_DOMAINS.contains(&domain) => "Personal",
        Some(_) => "Other",
    }
}

pub fn transform_customers(
    raw: &DataFrame,
    transformed_at: NaiveDateTime,
) -> Result<DataFrame, FrameError> {
    require_columns(raw, &["customer_name", "email", "region"])?;
    let mut df = raw.clone();

    let names: Vec<Option<String>> = string_values(df.column("customer_name")?)?
        .into_iter()
        .map(|name| name.map(|n| title_case(n.trim())))
        .collect();

    let emails: Vec<Option<String>> = string_values(df.column("email")?)?
        .into_iter()
        .map(|email| email.map(|e| e.trim().to_lowercase()))
        .collect();

    let regions: Vec<String> = string_values(df.column("region")?)?
        .into_iter()
        .map(|region| match region {
            Some(value) => value.trim().to_uppercase(),
            None => UNKNOWN_REGION.to_string(),
        })
        .collect();

    let domains: Vec<Option<String>> = emails
        .iter()
        .map(|email| {
            email
                .as_deref()
                .and_then(|e| e.split_once('@'))
                .map(|(_, domain)| domain.to_string())
        })
        .collect();

    let segments: Vec<&str> = domains
        .iter()
        .map(|domain| categorize_customer(domain.as_deref()))
        .collect();

    let stamp = transformed_at.and_utc().timestamp_micros();
    let height = df.height();

    df.with_column(Series::new("customer_name".into(), names))?;
    df.with_column(Series::new("email".into(), emails))?;
    df.with_column(Series::new("region".into(), regions))?;
    df.with_column(Series::new("email_domain".into(), domains))?;
    df.with_column(Series::new("customer_segment".into(), segments))?;
    df.with_column(datetime_series("transformed_at", vec![Some(stamp); height])?)?;

    Ok(df)
}
