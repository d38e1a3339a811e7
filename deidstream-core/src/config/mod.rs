//! Processor configuration.
//!
//! Configuration is split the way users think about it:
//! - **Risk settings**: the three risk ceilings and the quasi-identifiers
//! - **Runtime settings**: mode, row blocking and engine tuning
//! - **Schema**: optional declared types of the inbound fields
//!
//! The whole configuration is read-only once a stream instance is built.
//!
//! # Example
//! ```rust
//! use deidstream_core::config::ProcessorConfig;
//!
//! let config = ProcessorConfig::from_json_str(
//!     r#"{"risk": {"highest_risk": 0.5, "qis": [{"field": "age"}]},
//!         "runtime": {"mode": "assess", "block_size": 100}}"#,
//! )?;
//! assert_eq!(config.runtime.block_size, 100);
//! # Ok::<(), deidstream_core::DeidError>(())
//! ```

mod risk;
mod runtime;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::InputSchema;
use crate::{DeidError, Result};

pub use risk::{
    DEFAULT_AVERAGE_RISK, DEFAULT_HIGHEST_RISK, DEFAULT_RECORDS_AT_RISK, QuasiIdentifier,
    RiskProfile, RiskSettings,
};
pub use runtime::{Mode, RuntimeSettings};

/// Validation errors for processor configuration.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("highest_risk must be in (0.0, 1.0], got {0}")]
    InvalidHighestRisk(f64),
    #[error("average_risk must be between 0.0 and 1.0, got {0}")]
    InvalidAverageRisk(f64),
    #[error("records_at_risk must be between 0.0 and 1.0, got {0}")]
    InvalidRecordsAtRisk(f64),
    #[error("quasi-identifier field name must not be empty, got '{0}'")]
    EmptyQuasiIdentifier(String),
    #[error("records_per_iteration must be between 0.0 and 1.0, got {0}")]
    InvalidRecordsPerIteration(f64),
    #[error("snapshot sizes must be in (0.0, 1.0], got {0}")]
    InvalidSnapshotSize(f64),
}

impl From<ConfigValidationError> for DeidError {
    fn from(error: ConfigValidationError) -> Self {
        DeidError::configuration(error.to_string())
    }
}

/// Complete configuration of one stream instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Risk thresholds and quasi-identifiers
    pub risk: RiskSettings,
    /// Mode, blocking and engine tuning
    pub runtime: RuntimeSettings,
    /// Declared input field types
    pub schema: Option<InputSchema>,
}

impl ProcessorConfig {
    /// Creates a configuration from its parts.
    pub fn new(risk: RiskSettings, runtime: RuntimeSettings) -> Self {
        Self {
            risk,
            runtime,
            schema: None,
        }
    }

    /// Builder method to attach a declared input schema.
    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DeidError::serialization("Parsing processor configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DeidError::io(format!("Reading configuration {}", path.display()), e)
        })?;
        Self::from_json_str(&json)
    }

    /// Declared input columns, falling back to the schema's field order.
    pub fn declared_columns(&self) -> Vec<String> {
        if !self.runtime.input_columns.is_empty() {
            return self.runtime.input_columns.clone();
        }
        self.schema
            .as_ref()
            .map(InputSchema::column_names)
            .unwrap_or_default()
    }

    /// Validates every section.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        self.risk.validate()?;
        self.runtime.validate()
    }
}
