//! Writes transformed frames into the store through per-table staging tables.
//!
//! Every destination is staged into `stg_<table>` (dropped and recreated) and then moved into
//! the target. With a merge key, target rows sharing a staged key are deleted before the staged
//! rows are inserted; otherwise the staged rows are appended.
//! All destinations share one transaction owned by the caller.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection};
use tracing::info;

use crate::config::DestinationConfig;
use crate::db::quote_ident;
use crate::entities::entity_for;
use crate::error::{PipelineError, Result};
use crate::frame::{
    datetime_micros, days_to_date, f64_values, i64_values, micros_to_naive, string_values,
};

/// Bound parameters per multi-row insert.
const MAX_BIND_PARAMS: usize = 900;

/// A single cell ready to be bound to a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl SqlValue {
    fn bind<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Date(v) => query.bind(*v),
        }
    }
}

/// Column list written for a destination table. `None` keeps every column of the frame.
pub fn destination_columns(table: &str) -> Option<&'static [&'static str]> {
    entity_for(table).map(|entity| entity.destination_columns())
}

/// Restricts a frame to the columns of its destination table, in table order.
pub fn project(df: &DataFrame, table: &str) -> Result<DataFrame> {
    match destination_columns(table) {
        Some(columns) => df
            .select(columns.iter().copied())
            .map_err(|err| PipelineError::load(table, err)),
        None => Ok(df.clone()),
    }
}

pub fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Date => "DATE",
        DataType::Datetime(_, _) => "TIMESTAMP",
        _ => "TEXT",
    }
}

/// Converts a column into bindable cells. Non-finite floats become null.
pub fn column_values(column: &Column) -> Result<Vec<SqlValue>> {
    let values = match column.dtype() {
        DataType::Boolean => column
            .as_materialized_series()
            .bool()?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Bool))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => i64_values(column)?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Int))
            .collect(),
        DataType::Float32 | DataType::Float64 => f64_values(column)?
            .into_iter()
            .map(|v| match v {
                Some(v) if v.is_finite() => SqlValue::Float(v),
                _ => SqlValue::Null,
            })
            .collect(),
        DataType::Datetime(_, _) => datetime_micros(column, true)
            .map_err(|err| PipelineError::load(column.name(), err))?
            .into_iter()
            .map(|v| match v.and_then(micros_to_naive) {
                Some(ts) => SqlValue::Timestamp(ts),
                None => SqlValue::Null,
            })
            .collect(),
        DataType::Date => column
            .cast(&DataType::Int32)?
            .as_materialized_series()
            .i32()?
            .into_iter()
            .map(|v| match v.and_then(days_to_date) {
                Some(date) => SqlValue::Date(date),
                None => SqlValue::Null,
            })
            .collect(),
        DataType::Null => vec![SqlValue::Null; column.len()],
        _ => string_values(column)?
            .into_iter()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Text))
            .collect(),
    };
    Ok(values)
}

/// Loads one destination inside the caller's transaction and returns the number of rows staged.
pub async fn load_destination(
    conn: &mut SqliteConnection,
    destination: &DestinationConfig,
    df: &DataFrame,
) -> Result<usize> {
    let table = destination.table.as_str();
    let projected = project(df, table)?;
    let columns: Vec<String> = projected
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    if let Some(key) = destination.merge_key.as_deref() {
        if !columns.iter().any(|column| column == key) {
            return Err(PipelineError::load(
                table,
                format!("merge key '{key}' is not among the loaded columns"),
            ));
        }
    }

    let staging = format!("stg_{table}");
    create_table(conn, &staging, &projected, None, true).await?;
    insert_rows(conn, &staging, &projected).await?;

    create_table(conn, table, &projected, destination.merge_key.as_deref(), false).await?;

    let column_list = columns
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");
    let target = quote_ident(table);
    let source = quote_ident(&staging);

    let verb = match destination.merge_key.as_deref() {
        Some(key) => {
            // The target may carry no unique constraint on the merge key.
            let key = quote_ident(key);
            sqlx::query(&format!(
                "DELETE FROM {target} WHERE {key} IN (SELECT {key} FROM {source})"
            ))
            .execute(&mut *conn)
            .await
            .map_err(|err| PipelineError::load(table, err))?;
            "INSERT OR REPLACE INTO"
        }
        None => "INSERT INTO",
    };
    let statement =
        format!("{verb} {target} ({column_list}) SELECT {column_list} FROM {source}");
    sqlx::query(&statement)
        .execute(&mut *conn)
        .await
        .map_err(|err| PipelineError::load(table, err))?;

    let rows = projected.height();
    info!(
        table,
        rows,
        merge_key = destination.merge_key.as_deref().unwrap_or(""),
        "Loaded destination table"
    );
    Ok(rows)
}

/// Creates a table shaped like `df`. Staging tables are always rebuilt; targets are created
/// only when missing, with the merge key as primary key.
async fn create_table(
    conn: &mut SqliteConnection,
    table: &str,
    df: &DataFrame,
    primary_key: Option<&str>,
    replace: bool,
) -> Result<()> {
    if replace {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(&mut *conn)
            .await
            .map_err(|err| PipelineError::load(table, err))?;
    }

    let definitions = df
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().as_str();
            let mut definition = format!("{} {}", quote_ident(name), sql_type(column.dtype()));
            if primary_key == Some(name) {
                definition.push_str(" PRIMARY KEY");
            }
            definition
        })
        .collect::<Vec<_>>()
        .join(", ");

    let statement = format!(
        "CREATE TABLE IF NOT EXISTS {} ({definitions})",
        quote_ident(table)
    );
    sqlx::query(&statement)
        .execute(&mut *conn)
        .await
        .map_err(|err| PipelineError::load(table, err))?;
    Ok(())
}

async fn insert_rows(conn: &mut SqliteConnection, table: &str, df: &DataFrame) -> Result<()> {
    let width = df.width();
    if width == 0 || df.height() == 0 {
        return Ok(());
    }

    let columns = df
        .get_columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    let column_list = df
        .get_column_names()
        .iter()
        .map(|name| quote_ident(name.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = format!("({})", vec!["?"; width].join(", "));
    let rows_per_statement = (MAX_BIND_PARAMS / width).max(1);

    let mut start = 0;
    while start < df.height() {
        let end = (start + rows_per_statement).min(df.height());
        let statement = format!(
            "INSERT INTO {} ({column_list}) VALUES {}",
            quote_ident(table),
            vec![placeholders.as_str(); end - start].join(", ")
        );

        let mut query = sqlx::query(&statement);
        for row in start..end {
            for column in &columns {
                query = column[row].bind(query);
            }
        }
        query
            .execute(&mut *conn)
            .await
            .map_err(|err| PipelineError::load(table, err))?;

        start = end;
    }
    Ok(())
}
