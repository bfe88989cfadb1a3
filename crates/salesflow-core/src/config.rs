use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Pipeline configuration, loaded once per run and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub quality_checks: QualityCheckConfig,
    #[serde(default)]
    pub star_schema: StarSchemaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Raw type tag. Unknown values are accepted here and rejected by the extract stage.
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Database,
}

impl FromStr for SourceKind {
    type Err = ();

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "csv" => Ok(SourceKind::Csv),
            "database" => Ok(SourceKind::Database),
            _ => Err(()),
        }
    }
}

impl SourceConfig {
    pub fn kind(&self) -> Result<SourceKind> {
        self.source_type
            .parse()
            .map_err(|_| PipelineError::UnsupportedSource {
                source_name: self.name.clone(),
                source_type: self.source_type.clone(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
    pub table: String,
    #[serde(default)]
    pub merge_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum share of passing checks per table, in `[0, 1]`.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub fail_on_error: bool,
}

impl Default for QualityCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            threshold: default_threshold(),
            fail_on_error: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.95
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarSchemaConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json(&raw).map_err(|err| match err {
            PipelineError::Configuration(message) => {
                PipelineError::Configuration(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(raw)
            .map_err(|err| PipelineError::Configuration(format!("invalid JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline_name.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "pipeline_name must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_checks.threshold) {
            return Err(PipelineError::Configuration(format!(
                "quality_checks.threshold must be within [0, 1], got {}",
                self.quality_checks.threshold
            )));
        }
        for destination in &self.destinations {
            if destination.table.trim().is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "destination for source {} has an empty table name",
                    destination.source
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_sections_take_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"pipeline_name": "p", "sources": [{"name": "sales", "type": "csv", "path": "s.csv"}]}"#,
        )
        .unwrap();
        assert!(config.quality_checks.enabled);
        assert!(!config.quality_checks.fail_on_error);
        assert!(!config.star_schema.enabled);
        assert_eq!(config.sources[0].kind().unwrap(), SourceKind::Csv);
    }

    #[test]
    fn unknown_source_type_is_rejected_lazily() {
        let config = PipelineConfig::from_json(
            r#"{"pipeline_name": "p", "sources": [{"name": "x", "type": "parquet", "path": "x"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            config.sources[0].kind(),
            Err(PipelineError::UnsupportedSource { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = PipelineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
