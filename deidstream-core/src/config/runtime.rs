//! Runtime settings.
//!
//! Controls the processing mode, row blocking and the tuning knobs handed
//! to the anonymization engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigValidationError;

/// What the processor does with each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Transform blocks until they satisfy the risk thresholds
    #[default]
    Anonymize,
    /// Leave blocks unchanged and route them by their measured risk
    Assess,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Anonymize => write!(f, "anonymize"),
            Mode::Assess => write!(f, "assess"),
        }
    }
}

/// Runtime behavior of a stream instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Operation mode
    pub mode: Mode,
    /// Rows per block; zero disables row blocking
    pub block_size: usize,
    /// Fraction of records handled per optimization iteration
    pub records_per_iteration: f64,
    /// Time budget per heuristic search iteration
    pub seconds_per_iteration: u64,
    /// Above this many quasi-identifiers the heuristic search is used
    pub max_qis_optimal: usize,
    /// Maximum snapshot size relative to the dataset
    pub snapshot_size_dataset: f64,
    /// Maximum snapshot size relative to the previous snapshot
    pub snapshot_size_snapshot: f64,
    /// Maximum number of snapshots kept in the engine's history
    pub cache_size: usize,
    /// Declared input column order
    pub input_columns: Vec<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Anonymize,
            block_size: 0,
            records_per_iteration: 0.01,
            seconds_per_iteration: 30,
            max_qis_optimal: 15,
            snapshot_size_dataset: 0.2,
            snapshot_size_snapshot: 0.8,
            cache_size: 200,
            input_columns: Vec::new(),
        }
    }
}

impl RuntimeSettings {
    /// Creates runtime settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder method to set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Builder method to set the records handled per iteration.
    pub fn with_records_per_iteration(mut self, fraction: f64) -> Self {
        if !(0.0..=1.0).contains(&fraction) {
            tracing::warn!(
                "records_per_iteration {} clamped to valid range [0.0, 1.0]",
                fraction
            );
        }
        self.records_per_iteration = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the per-iteration time budget.
    pub fn with_seconds_per_iteration(mut self, seconds: u64) -> Self {
        self.seconds_per_iteration = seconds;
        self
    }

    /// Builder method to set the quasi-identifier count above which the
    /// heuristic search is used.
    pub fn with_max_qis_optimal(mut self, max: usize) -> Self {
        self.max_qis_optimal = max;
        self
    }

    /// Builder method to set the engine's cache tuning.
    pub fn with_cache_tuning(mut self, dataset: f64, snapshot: f64, history: usize) -> Self {
        self.snapshot_size_dataset = dataset;
        self.snapshot_size_snapshot = snapshot;
        self.cache_size = history;
        self
    }

    /// Builder method to declare the input column order.
    pub fn with_input_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Return, if row blocking is enabled. This is the case if the block
    /// size is greater than zero.
    pub fn row_blocking(&self) -> bool {
        self.block_size > 0
    }

    /// Time budget of one heuristic search iteration.
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.seconds_per_iteration)
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.records_per_iteration) {
            return Err(ConfigValidationError::InvalidRecordsPerIteration(
                self.records_per_iteration,
            ));
        }
        for value in [self.snapshot_size_dataset, self.snapshot_size_snapshot] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigValidationError::InvalidSnapshotSize(value));
            }
        }
        Ok(())
    }
}
