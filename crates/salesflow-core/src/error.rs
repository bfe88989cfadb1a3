// crates/salesflow-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported source type '{source_type}' for source {source_name}")]
    UnsupportedSource {
        source_name: String,
        source_type: String,
    },

    #[error("Extraction failed for source {source_name}: {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    #[error("Transformation failed for {entity}: {message}")]
    Transform { entity: String, message: String },

    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    #[error(
        "Quality gate failed for {table}: {passed}/{total} checks passed (threshold {threshold})"
    )]
    QualityGate {
        table: String,
        passed: usize,
        total: usize,
        threshold: f64,
    },

    #[error("Run ledger error: {0}")]
    Ledger(String),

    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn extraction(source_name: &str, err: impl std::fmt::Display) -> Self {
        Self::Extraction {
            source_name: source_name.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn transform(entity: &str, err: impl std::fmt::Display) -> Self {
        Self::Transform {
            entity: entity.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn load(table: &str, err: impl std::fmt::Display) -> Self {
        Self::Load {
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
