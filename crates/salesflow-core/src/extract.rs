use std::io::Read;
use std::path::Path;

use polars::prelude::*;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Executor, Row, TypeInfo, ValueRef};
use thiserror::Error;

use crate::db::DbPool;

/// Cell spellings read as missing values.
const NULL_TOKENS: [&str; 9] = ["", "NA", "N/A", "#N/A", "NaN", "nan", "null", "NULL", "None"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub fn read_csv_path(path: &Path) -> Result<DataFrame, ExtractError> {
    let file = std::fs::File::open(path).map_err(|source| ExtractError::Open {
        path: path.display().to_string(),
        source,
    })?;
    read_csv(file)
}

/// Reads delimited text with a header row, inferring one dtype per column.
pub fn read_csv<R: Read>(reader: R) -> Result<DataFrame, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (idx, field) in record.iter().enumerate() {
            let value = if NULL_TOKENS.contains(&field) {
                None
            } else {
                Some(field.to_string())
            };
            cells[idx].push(value);
        }
    }

    let columns = headers
        .iter()
        .zip(cells)
        .map(|(name, values)| infer_text_column(name, values).into())
        .collect::<Vec<Column>>();

    Ok(DataFrame::new(columns)?)
}

fn infer_text_column(name: &str, values: Vec<Option<String>>) -> Series {
    let present = || values.iter().flatten();

    if present().next().is_none() {
        return Series::new(name.into(), values);
    }

    if present().all(|v| v.parse::<i64>().is_ok()) {
        let parsed: Vec<Option<i64>> = values
            .iter()
            .map(|v| v.as_deref().and_then(|s| s.parse().ok()))
            .collect();
        return Series::new(name.into(), parsed);
    }

    if present().all(|v| v.parse::<f64>().is_ok()) {
        let parsed: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.as_deref().and_then(|s| s.parse().ok()))
            .collect();
        return Series::new(name.into(), parsed);
    }

    if present().all(|v| parse_bool(v).is_some()) {
        let parsed: Vec<Option<bool>> = values
            .iter()
            .map(|v| v.as_deref().and_then(parse_bool))
            .collect();
        return Series::new(name.into(), parsed);
    }

    Series::new(name.into(), values)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone)]
enum QueryCell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Runs a query against the store and materialises the result set as a frame.
pub async fn read_query(pool: &DbPool, query: &str) -> Result<DataFrame, ExtractError> {
    let rows = sqlx::query(query).fetch_all(pool).await?;

    let names: Vec<String> = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            let described = pool.describe(query).await?;
            described
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        }
    };

    let mut cells: Vec<Vec<QueryCell>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in &rows {
        for (idx, column_cells) in cells.iter_mut().enumerate() {
            column_cells.push(read_cell(row, idx)?);
        }
    }

    let columns = names
        .iter()
        .zip(cells)
        .map(|(name, values)| infer_query_column(name, values).into())
        .collect::<Vec<Column>>();

    Ok(DataFrame::new(columns)?)
}

fn read_cell(row: &SqliteRow, idx: usize) -> Result<QueryCell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(QueryCell::Null);
    }
    let storage = raw.type_info().name().to_string();
    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Ok(QueryCell::Integer(row.try_get::<i64, _>(idx)?)),
        "REAL" => Ok(QueryCell::Real(row.try_get::<f64, _>(idx)?)),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            Ok(QueryCell::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => Ok(QueryCell::Text(row.try_get::<String, _>(idx)?)),
    }
}

fn infer_query_column(name: &str, values: Vec<QueryCell>) -> Series {
    let mut has_integer = false;
    let mut has_real = false;
    let mut has_text = false;
    for value in &values {
        match value {
            QueryCell::Integer(_) => has_integer = true,
            QueryCell::Real(_) => has_real = true,
            QueryCell::Text(_) => has_text = true,
            QueryCell::Null => {}
        }
    }

    if has_text || !(has_integer || has_real) {
        let text: Vec<Option<String>> = values
            .into_iter()
            .map(|value| match value {
                QueryCell::Null => None,
                QueryCell::Integer(v) => Some(v.to_string()),
                QueryCell::Real(v) => Some(v.to_string()),
                QueryCell::Text(v) => Some(v),
            })
            .collect();
        return Series::new(name.into(), text);
    }

    if has_real {
        let reals: Vec<Option<f64>> = values
            .into_iter()
            .map(|value| match value {
                QueryCell::Integer(v) => Some(v as f64),
                QueryCell::Real(v) => Some(v),
                _ => None,
            })
            .collect();
        return Series::new(name.into(), reals);
    }

    let integers: Vec<Option<i64>> = values
        .into_iter()
        .map(|value| match value {
            QueryCell::Integer(v) => Some(v),
            _ => None,
        })
        .collect();
    Series::new(name.into(), integers)
}
