//! Batch orchestration: extract every source, transform and validate each table, then load
//! all destinations in one transaction. Every run is recorded in the run ledger.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, SourceConfig, SourceKind};
use crate::db::DbPool;
use crate::entities::entity_for;
use crate::error::{PipelineError, Result};
use crate::extract::{read_csv_path, read_query};
use crate::ledger::{RunLedger, RunStatus};
use crate::load::load_destination;
use crate::quality::{self, QualityResults};
use crate::star_schema::build_star_schema;
use crate::table::Tables;

/// Identity of the run currently executing, handed to the stages that record against it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: i64,
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: i64,
    pub status: RunStatus,
    pub records_processed: usize,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

pub struct SalesPipeline {
    config: PipelineConfig,
    pool: DbPool,
    ledger: RunLedger,
}

impl SalesPipeline {
    pub fn new(config: PipelineConfig, pool: DbPool) -> Self {
        let ledger = RunLedger::new(pool.clone());
        Self {
            config,
            pool,
            ledger,
        }
    }

    pub fn from_config_path(path: &Path, pool: DbPool) -> Result<Self> {
        let config = PipelineConfig::from_path(path)?;
        Ok(Self::new(config, pool))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Executes a full run and reports whether it completed.
    pub async fn run(&self) -> bool {
        match self.run_with_outcome().await {
            Ok(outcome) => outcome.succeeded(),
            Err(err) => {
                error!(pipeline = %self.config.pipeline_name, error = %err, "Run ledger unavailable");
                false
            }
        }
    }

    /// Executes a full run. Stage failures are recorded as a `FAILED` run rather than returned;
    /// only a ledger failure surfaces as `Err`.
    pub async fn run_with_outcome(&self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let run_id = self
            .ledger
            .create_run(&self.config.pipeline_name, started_at)
            .await?;
        let ctx = RunContext {
            run_id,
            pipeline_name: self.config.pipeline_name.clone(),
            started_at,
        };
        info!(run_id, pipeline = %ctx.pipeline_name, "Pipeline run started");

        let result = self.execute(&ctx).await;
        let finished_at = Utc::now();

        match result {
            Ok(records) => {
                self.ledger
                    .update_run(run_id, RunStatus::Completed, finished_at, records as i64, None)
                    .await?;
                info!(run_id, records, "Pipeline run completed");
                Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Completed,
                    records_processed: records,
                    error: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                error!(run_id, error = %message, "Pipeline run failed");
                self.ledger
                    .update_run(run_id, RunStatus::Failed, finished_at, 0, Some(&message))
                    .await?;
                Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Failed,
                    records_processed: 0,
                    error: Some(message),
                })
            }
        }
    }

    async fn execute(&self, ctx: &RunContext) -> Result<usize> {
        let extracted = self.extract().await?;
        let transformed = self.transform(ctx, extracted).await?;
        self.load(&transformed).await
    }

    /// Reads every configured source, in configuration order.
    pub async fn extract(&self) -> Result<Tables> {
        let mut tables = Tables::new();
        for source in &self.config.sources {
            let frame = self.extract_source(source).await?;
            info!(source = %source.name, rows = frame.height(), "Extracted source");
            tables.insert(source.name.clone(), frame);
        }
        if tables.is_empty() {
            warn!(pipeline = %self.config.pipeline_name, "No sources configured");
        }
        Ok(tables)
    }

    async fn extract_source(&self, source: &SourceConfig) -> Result<DataFrame> {
        match source.kind()? {
            SourceKind::Csv => {
                let path = source.path.as_deref().ok_or_else(|| {
                    PipelineError::extraction(&source.name, "csv source has no path")
                })?;
                read_csv_path(Path::new(path))
                    .map_err(|err| PipelineError::extraction(&source.name, err))
            }
            SourceKind::Database => {
                let query = source.query.as_deref().ok_or_else(|| {
                    PipelineError::extraction(&source.name, "database source has no query")
                })?;
                read_query(&self.pool, query)
                    .await
                    .map_err(|err| PipelineError::extraction(&source.name, err))
            }
        }
    }

    /// Enriches each extracted table, then validates it and records the results against `ctx`.
    pub async fn transform(&self, ctx: &RunContext, extracted: Tables) -> Result<Tables> {
        let now = Utc::now().naive_utc();
        let checks = &self.config.quality_checks;
        let mut transformed = Tables::new();

        for table in extracted {
            let frame = transform_frame(&table.name, &table.frame, now)?;

            if checks.enabled {
                let results = quality::validate_table(&frame, &table.name, now);
                self.ledger
                    .append_quality_results(ctx.run_id, &table.name, &results)
                    .await?;
                info!(
                    table = %table.name,
                    passed = quality::passed_count(&results),
                    total = results.len(),
                    "Recorded quality checks"
                );
                self.enforce_threshold(&table.name, &results)?;
            }

            info!(table = %table.name, rows = frame.height(), "Transformed table");
            transformed.insert(table.name, frame);
        }

        if self.config.star_schema.enabled {
            attach_star_schema(&mut transformed, ctx.started_at)?;
        }

        Ok(transformed)
    }

    fn enforce_threshold(&self, table: &str, results: &QualityResults) -> Result<()> {
        let checks = &self.config.quality_checks;
        let ratio = quality::pass_ratio(results);
        if ratio >= checks.threshold {
            return Ok(());
        }

        let passed = quality::passed_count(results);
        warn!(
            table,
            passed,
            total = results.len(),
            threshold = checks.threshold,
            "Quality checks below threshold"
        );
        if checks.fail_on_error {
            return Err(PipelineError::QualityGate {
                table: table.to_string(),
                passed,
                total: results.len(),
                threshold: checks.threshold,
            });
        }
        Ok(())
    }

    /// Writes every destination inside one transaction and returns the total rows loaded.
    pub async fn load(&self, transformed: &Tables) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut total = 0;

        for destination in &self.config.destinations {
            let Some(frame) = transformed.get(&destination.source) else {
                warn!(
                    source = %destination.source,
                    table = %destination.table,
                    "No transformed table for destination"
                );
                continue;
            };

            match load_destination(tx.as_mut(), destination, frame).await {
                Ok(rows) => total += rows,
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err);
                }
            }
        }

        tx.commit().await?;
        Ok(total)
    }

    /// Extracts and transforms without touching the ledger or destinations, returning the
    /// validation results per table.
    pub async fn check(&self) -> Result<Vec<(String, QualityResults)>> {
        let now = Utc::now().naive_utc();
        let extracted = self.extract().await?;

        let mut reports = Vec::with_capacity(extracted.len());
        for table in extracted {
            let frame = transform_frame(&table.name, &table.frame, now)?;
            let results = quality::validate_table(&frame, &table.name, now);
            reports.push((table.name, results));
        }
        Ok(reports)
    }
}

/// Applies the registered entity transform; names without one pass through unchanged.
fn transform_frame(
    name: &str,
    frame: &DataFrame,
    transformed_at: NaiveDateTime,
) -> Result<DataFrame> {
    match entity_for(name) {
        Some(entity) => entity
            .transform(frame, transformed_at)
            .map_err(|err| PipelineError::transform(name, err)),
        None => Ok(frame.clone()),
    }
}

fn attach_star_schema(tables: &mut Tables, built_at: DateTime<Utc>) -> Result<()> {
    let (Some(sales), Some(products), Some(customers)) = (
        tables.get("sales"),
        tables.get("products"),
        tables.get("customers"),
    ) else {
        warn!("Star schema enabled but sales, products or customers is missing; skipping");
        return Ok(());
    };

    let schema = build_star_schema(sales, products, customers, built_at.date_naive())
        .map_err(|err| PipelineError::transform("fact_sales", err))?;

    info!(
        fact_rows = schema.fact_sales.height(),
        dates = schema.dimensions.dim_date.height(),
        "Built star schema"
    );
    tables.insert("fact_sales", schema.fact_sales);
    tables.insert("dim_date", schema.dimensions.dim_date);
    tables.insert("dim_product", schema.dimensions.dim_product);
    tables.insert("dim_customer", schema.dimensions.dim_customer);
    Ok(())
}
