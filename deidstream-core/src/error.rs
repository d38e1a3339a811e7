//! Error types for block processing.
//!
//! Two families live here. [`DeidError`] is what the library reports to its
//! caller. [`EngineError`] is what the external anonymization engine and risk
//! estimator report back to the orchestrators, which decide whether a given
//! failure is recoverable (fallback to a fully suppressed block) or fatal.

use thiserror::Error;

/// Main error type for deidstream operations.
#[derive(Debug, Error)]
pub enum DeidError {
    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An inbound record could not be converted to a row
    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    /// A row does not line up with the header
    #[error("Row has {actual} cells but the header has {expected} columns")]
    RowShape { expected: usize, actual: usize },

    /// The refinement pass failed after a feasible result was found
    #[error("Refinement failed for block ({context}): {source}")]
    Refinement {
        context: BlockContext,
        #[source]
        source: EngineError,
    },

    /// The risk estimator could not assess a block
    #[error("Risk estimation failed for block ({context}): {source}")]
    Estimation {
        context: BlockContext,
        #[source]
        source: EngineError,
    },

    /// Aggregate statistics were requested before any block was processed
    #[error("No statistics stored")]
    NoStatistics,

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with DeidError
pub type Result<T> = std::result::Result<T, DeidError>;

/// Failures reported by the external anonymization engine or risk estimator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No transformation satisfies the requested privacy models
    #[error("No feasible solution: {0}")]
    Infeasible(String),

    /// The engine's output state is inconsistent and must be discarded
    #[error("Rollback required: {0}")]
    RollbackRequired(String),

    /// Any other engine-internal failure
    #[error("Engine internal error: {0}")]
    Internal(String),

    /// I/O failure inside the engine
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to reproduce a block failure.
///
/// Attached to fatal block errors so the report carries the block size,
/// the quasi-identifiers and the configured thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockContext {
    /// Number of data rows in the block (header excluded)
    pub data_rows: usize,
    /// Configured quasi-identifier columns
    pub quasi_identifiers: Vec<String>,
    /// Highest-risk ceiling
    pub highest_risk: f64,
    /// Average-risk ceiling
    pub average_risk: f64,
    /// Records-at-risk ceiling
    pub records_at_risk: f64,
}

impl std::fmt::Display for BlockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows={}, qis=[{}], highest_risk={}, average_risk={}, records_at_risk={}",
            self.data_rows,
            self.quasi_identifiers.join(","),
            self.highest_risk,
            self.average_risk,
            self.records_at_risk
        )
    }
}

impl DeidError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid record error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a refinement error for the given block
    pub fn refinement_failed(context: BlockContext, source: EngineError) -> Self {
        Self::Refinement { context, source }
    }

    /// Creates an estimation error for the given block
    pub fn estimation_failed(context: BlockContext, source: EngineError) -> Self {
        Self::Estimation { context, source }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}
