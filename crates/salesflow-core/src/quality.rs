//! Declarative data-quality rules and the validator that evaluates them.
//!
//! Every check runs regardless of the others and never fails the caller: a column that is
//! absent or cannot be read simply contributes no findings.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::entities::{entity_for, EntityStrategy};
use crate::frame::{f64_values, has_column, value_key};

#[derive(Debug, Clone, Copy)]
pub struct NumericRange {
    pub column: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Static rule bundle for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct QualityRuleSet {
    pub required_columns: &'static [&'static str],
    pub not_null_columns: &'static [&'static str],
    pub numeric_ranges: &'static [NumericRange],
    pub unique_columns: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    RequiredColumns,
    NotNullColumns,
    NumericRanges,
    UniqueColumns,
    DataTypes,
    CustomChecks,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::RequiredColumns => "required_columns",
            CheckType::NotNullColumns => "not_null_columns",
            CheckType::NumericRanges => "numeric_ranges",
            CheckType::UniqueColumns => "unique_columns",
            CheckType::DataTypes => "data_types",
            CheckType::CustomChecks => "custom_checks",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityResult {
    pub passed: bool,
    pub details: Value,
}

/// Results keyed by check type, iterated in check order.
pub type QualityResults = BTreeMap<CheckType, QualityResult>;

/// Validates a table by its source name. Names without a registered entity yield no results.
pub fn validate_table(df: &DataFrame, table_name: &str, now: NaiveDateTime) -> QualityResults {
    match entity_for(table_name) {
        Some(entity) => validate(df, entity, now),
        None => QualityResults::new(),
    }
}

pub fn validate(df: &DataFrame, entity: &dyn EntityStrategy, now: NaiveDateTime) -> QualityResults {
    let rules = entity.rules();
    let mut results = QualityResults::new();

    results.insert(
        CheckType::RequiredColumns,
        check_required_columns(df, rules.required_columns),
    );
    results.insert(
        CheckType::NotNullColumns,
        check_not_null(df, rules.not_null_columns),
    );
    results.insert(
        CheckType::NumericRanges,
        check_numeric_ranges(df, rules.numeric_ranges),
    );
    results.insert(
        CheckType::UniqueColumns,
        check_unique_columns(df, rules.unique_columns),
    );
    results.insert(CheckType::DataTypes, issues_result(entity.type_issues(df)));
    results.insert(
        CheckType::CustomChecks,
        issues_result(entity.custom_issues(df, now)),
    );

    results
}

pub fn check_required_columns(df: &DataFrame, required: &[&str]) -> QualityResult {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !has_column(df, name))
        .collect();

    QualityResult {
        passed: missing.is_empty(),
        details: json!({ "missing_columns": missing }),
    }
}

pub fn check_not_null(df: &DataFrame, columns: &[&str]) -> QualityResult {
    let mut null_counts = Map::new();
    for name in columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let count = missing_count(column);
        if count > 0 {
            null_counts.insert((*name).to_string(), json!(count));
        }
    }

    QualityResult {
        passed: null_counts.is_empty(),
        details: json!({ "null_counts": null_counts }),
    }
}

/// Nulls plus NaN floats.
fn missing_count(column: &Column) -> usize {
    match column.dtype() {
        DataType::Float32 | DataType::Float64 => f64_values(column)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| v.map_or(true, f64::is_nan))
                    .count()
            })
            .unwrap_or_else(|_| column.null_count()),
        _ => column.null_count(),
    }
}

pub fn check_numeric_ranges(df: &DataFrame, ranges: &[NumericRange]) -> QualityResult {
    let mut out_of_range = Map::new();
    for range in ranges {
        let Ok(column) = df.column(range.column) else {
            continue;
        };
        let Ok(values) = f64_values(column) else {
            continue;
        };
        let min = range.min.unwrap_or(f64::NEG_INFINITY);
        let max = range.max.unwrap_or(f64::INFINITY);

        let below = values.iter().flatten().filter(|v| **v < min).count();
        let above = values.iter().flatten().filter(|v| **v > max).count();

        if below > 0 || above > 0 {
            out_of_range.insert(
                range.column.to_string(),
                json!({ "below_min": below, "above_max": above }),
            );
        }
    }

    QualityResult {
        passed: out_of_range.is_empty(),
        details: json!({ "out_of_range": out_of_range }),
    }
}

pub fn check_unique_columns(df: &DataFrame, columns: &[&str]) -> QualityResult {
    let mut duplicates = Map::new();
    for name in columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let count = duplicated_count(column);
        if count > 0 {
            duplicates.insert((*name).to_string(), json!(count));
        }
    }

    QualityResult {
        passed: duplicates.is_empty(),
        details: json!({ "duplicate_counts": duplicates }),
    }
}

/// Occurrences after the first of each value; repeated nulls count as duplicates too.
fn duplicated_count(column: &Column) -> usize {
    let mut seen: HashSet<Option<String>> = HashSet::with_capacity(column.len());
    let mut duplicates = 0;
    for idx in 0..column.len() {
        let Ok(value) = column.get(idx) else {
            continue;
        };
        if !seen.insert(value_key(&value)) {
            duplicates += 1;
        }
    }
    duplicates
}

fn issues_result(issues: Vec<String>) -> QualityResult {
    QualityResult {
        passed: issues.is_empty(),
        details: json!({ "issues": issues }),
    }
}

pub fn passed_count(results: &QualityResults) -> usize {
    results.values().filter(|result| result.passed).count()
}

/// Share of passing checks; an empty result set counts as fully passing.
pub fn pass_ratio(results: &QualityResults) -> f64 {
    if results.is_empty() {
        1.0
    } else {
        passed_count(results) as f64 / results.len() as f64
    }
}

/// Human-readable pass/fail summary with the details of every failed check.
pub fn render_report(results: &QualityResults) -> String {
    let mut lines = vec![format!(
        "Quality Check Summary: {}/{} checks passed",
        passed_count(results),
        results.len()
    )];

    for (check, result) in results {
        if result.passed {
            lines.push(format!("✓ {check}: PASSED"));
        } else {
            lines.push(format!("✗ {check}: FAILED"));
            lines.push(format!("  Details: {}", result.details));
        }
    }

    lines.join("\n")
}
