use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DbPool;
use crate::error::{PipelineError, Result};
use crate::quality::QualityResults;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "STARTED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "STARTED" => Ok(RunStatus::Started),
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(PipelineError::Ledger(format!("unknown run status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: i64,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub records_processed: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityLogEntry {
    pub log_id: i64,
    pub run_id: i64,
    pub table_name: String,
    pub check_type: String,
    pub check_result: bool,
    pub details: Option<Value>,
    pub created_at: Option<NaiveDateTime>,
}

/// Durable record of pipeline runs and the quality findings made during them.
///
/// Each call commits on its own, so entries written before a later failure are kept.
#[derive(Debug, Clone)]
pub struct RunLedger {
    pool: DbPool,
}

impl RunLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens a run in `STARTED` state and returns its id.
    pub async fn create_run(&self, pipeline_name: &str, started_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query(
            r#"
                INSERT INTO pipeline_runs (pipeline_name, status, start_time)
                VALUES (?, ?, ?)
            "#,
        )
        .bind(pipeline_name)
        .bind(RunStatus::Started.as_str())
        .bind(started_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Finalizes an open run. A run leaves `STARTED` exactly once.
    pub async fn update_run(
        &self,
        run_id: i64,
        status: RunStatus,
        end_time: DateTime<Utc>,
        records_processed: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        if status == RunStatus::Started {
            return Err(PipelineError::Ledger(format!(
                "run {run_id} cannot be moved back to {status}"
            )));
        }

        let result = sqlx::query(
            r#"
                UPDATE pipeline_runs
                SET status = ?,
                    end_time = ?,
                    records_processed = ?,
                    error_message = ?
                WHERE run_id = ? AND status = 'STARTED'
            "#,
        )
        .bind(status.as_str())
        .bind(end_time.naive_utc())
        .bind(records_processed)
        .bind(error_message)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Ledger(format!(
                "run {run_id} does not exist or is already finalized"
            )));
        }
        Ok(())
    }

    pub async fn append_quality_log(
        &self,
        run_id: i64,
        table_name: &str,
        check_type: &str,
        passed: bool,
        details: &Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
                INSERT INTO data_quality_logs (run_id, table_name, check_type, check_result, details)
                VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(table_name)
        .bind(check_type)
        .bind(passed)
        .bind(serde_json::to_string(details)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists every result for one table in a single commit.
    pub async fn append_quality_results(
        &self,
        run_id: i64,
        table_name: &str,
        results: &QualityResults,
    ) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (check, result) in results {
            sqlx::query(
                r#"
                    INSERT INTO data_quality_logs (run_id, table_name, check_type, check_result, details)
                    VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(table_name)
            .bind(check.as_str())
            .bind(result.passed)
            .bind(serde_json::to_string(&result.details)?)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn fetch_run(&self, run_id: i64) -> Result<Option<PipelineRun>> {
        let record = sqlx::query(
            r#"
                SELECT run_id, pipeline_name, status, start_time, end_time,
                       records_processed, error_message
                FROM pipeline_runs
                WHERE run_id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        record.as_ref().map(run_from_row).transpose()
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<PipelineRun>> {
        let rows = sqlx::query(
            r#"
                SELECT run_id, pipeline_name, status, start_time, end_time,
                       records_processed, error_message
                FROM pipeline_runs
                ORDER BY run_id DESC
                LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }

    pub async fn quality_logs(&self, run_id: i64) -> Result<Vec<QualityLogEntry>> {
        let rows = sqlx::query(
            r#"
                SELECT log_id, run_id, table_name, check_type, check_result, details, created_at
                FROM data_quality_logs
                WHERE run_id = ?
                ORDER BY log_id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let details: Option<String> = row.try_get("details")?;
            entries.push(QualityLogEntry {
                log_id: row.try_get("log_id")?,
                run_id: row.try_get("run_id")?,
                table_name: row.try_get("table_name")?,
                check_type: row.try_get("check_type")?,
                check_result: row.try_get("check_result")?,
                details: details.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }
}

fn run_from_row(row: &SqliteRow) -> Result<PipelineRun> {
    let status: String = row.try_get("status")?;
    Ok(PipelineRun {
        run_id: row.try_get("run_id")?,
        pipeline_name: row.try_get("pipeline_name")?,
        status: status.parse()?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        records_processed: row.try_get("records_processed")?,
        error_message: row.try_get("error_message")?,
    })
}
