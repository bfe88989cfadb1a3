//! Column-level helpers shared by the transforms and the quality checks.
//!
//! Frames arrive with whatever dtypes the extractor inferred, so every accessor here
//! normalises a column into plain `Vec<Option<_>>` values before the caller works on it.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use thiserror::Error;

const MICROS_PER_DAY: i64 = 86_400_000_000;
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error("column {column} has unparseable date value '{value}'")]
    UnparseableDate { column: String, value: String },
    #[error("column {column} has dtype {dtype}, expected a date/time or string column")]
    UnsupportedDtype { column: String, dtype: String },
    #[error("missing column {0}")]
    MissingColumn(String),
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn require_columns(df: &DataFrame, names: &[&str]) -> Result<(), FrameError> {
    match names.iter().find(|name| !has_column(df, name)) {
        Some(missing) => Err(FrameError::MissingColumn((*missing).to_string())),
        None => Ok(()),
    }
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
    )
}

pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

/// Values of a column as `f64`. Non-numeric text becomes null.
pub fn f64_values(column: &Column) -> PolarsResult<Vec<Option<f64>>> {
    let casted = column.cast(&DataType::Float64)?;
    Ok(casted.as_materialized_series().f64()?.into_iter().collect())
}

pub fn i64_values(column: &Column) -> PolarsResult<Vec<Option<i64>>> {
    let casted = column.cast(&DataType::Int64)?;
    Ok(casted.as_materialized_series().i64()?.into_iter().collect())
}

pub fn string_values(column: &Column) -> PolarsResult<Vec<Option<String>>> {
    let casted = column.cast(&DataType::String)?;
    Ok(casted
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Values of a date/time-like column as microseconds since the Unix epoch.
///
/// With `strict`, a string that matches no known layout is an error; otherwise it becomes null.
pub fn datetime_micros(column: &Column, strict: bool) -> Result<Vec<Option<i64>>, FrameError> {
    match column.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = i64_values(&column.cast(&DataType::Int64)?)?;
            Ok(raw
                .into_iter()
                .map(|value| value.map(|v| to_micros(v, unit)))
                .collect())
        }
        DataType::Date => {
            let days = column.cast(&DataType::Int32)?;
            Ok(days
                .as_materialized_series()
                .i32()?
                .into_iter()
                .map(|value| value.map(|d| d as i64 * MICROS_PER_DAY))
                .collect())
        }
        DataType::String => {
            let values = column.as_materialized_series().str()?;
            let mut out = Vec::with_capacity(values.len());
            for value in values.into_iter() {
                match value.map(str::trim) {
                    None | Some("") => out.push(None),
                    Some(text) => match parse_datetime(text) {
                        Some(parsed) => out.push(Some(parsed.and_utc().timestamp_micros())),
                        None if strict => {
                            return Err(FrameError::UnparseableDate {
                                column: column.name().to_string(),
                                value: text.to_string(),
                            })
                        }
                        None => out.push(None),
                    },
                }
            }
            Ok(out)
        }
        DataType::Null => Ok(vec![None; column.len()]),
        other if strict => Err(FrameError::UnsupportedDtype {
            column: column.name().to_string(),
            dtype: other.to_string(),
        }),
        _ => Ok(vec![None; column.len()]),
    }
}

fn to_micros(value: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => value / 1_000,
        TimeUnit::Microseconds => value,
        TimeUnit::Milliseconds => value * 1_000,
    }
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn micros_to_naive(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
}

pub fn datetime_series(name: &str, micros: Vec<Option<i64>>) -> PolarsResult<Series> {
    Series::new(name.into(), micros).cast(&DataType::Datetime(TimeUnit::Microseconds, None))
}

pub fn date_series(name: &str, days: Vec<Option<i32>>) -> PolarsResult<Series> {
    Series::new(name.into(), days).cast(&DataType::Date)
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(ch);
            previous_alpha = false;
        }
    }
    out
}

pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Ordered right-closed bins: a value `v` gets `labels[i]` when `edges[i] < v <= edges[i + 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Bins {
    pub edges: &'static [f64],
    pub labels: &'static [&'static str],
}

impl Bins {
    pub fn label(&self, value: Option<f64>) -> Option<&'static str> {
        let value = value?;
        self.edges
            .windows(2)
            .position(|edge| value > edge[0] && value <= edge[1])
            .and_then(|idx| self.labels.get(idx).copied())
    }
}

/// Canonical textual key for a cell, used for duplicate detection and hash joins.
///
/// Whole floats collapse onto their integer spelling so `101` and `101.0` meet.
pub fn value_key(value: &AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::Float32(v) => Some(float_key(*v as f64)),
        AnyValue::Float64(v) => Some(float_key(*v)),
        AnyValue::String(v) => Some((*v).to_string()),
        AnyValue::StringOwned(v) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

fn float_key(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("wireless MOUSE"), "Wireless Mouse");
        assert_eq!(title_case("o'neil-smith"), "O'Neil-Smith");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn parses_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-01-06"), Some(expected));
        assert_eq!(parse_datetime("2024-01-06 00:00:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-06T00:00:00Z"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn epoch_day_conversions_agree() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(date_to_days(date), 1);
        assert_eq!(days_to_date(1), Some(date));
    }

    #[test]
    fn float_keys_collapse_whole_numbers() {
        assert_eq!(value_key(&AnyValue::Float64(101.0)), Some("101".to_string()));
        assert_eq!(value_key(&AnyValue::Int64(101)), Some("101".to_string()));
        assert_eq!(value_key(&AnyValue::Null), None);
    }
}
