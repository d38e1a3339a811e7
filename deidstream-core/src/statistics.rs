//! Cross-block statistics.
//!
//! Anonymize mode tracks how many cells were suppressed; assess mode keeps
//! one `(result, rows)` entry per block and aggregates them on demand. Both
//! modes share the run timing and block/row counters that end up in the
//! [`RunReport`].

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Mode, RiskProfile};
use crate::models::{Block, NULL_SENTINEL};
use crate::{DeidError, Result};

/// Running totals of one stream instance.
#[derive(Debug, Clone)]
pub struct Statistics {
    suppressed_cells: u64,
    total_cells: u64,
    anonymized_blocks: u64,
    risks: Vec<(RiskProfile, u64)>,
    blocks: u64,
    rows: u64,
    run_id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    /// Starts the run clock with empty totals.
    pub fn new() -> Self {
        Self {
            suppressed_cells: 0,
            total_cells: 0,
            anonymized_blocks: 0,
            risks: Vec::new(),
            blocks: 0,
            rows: 0,
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Identifier of this run, shared by its report.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Counts one processed block, whatever the mode.
    pub fn record_block(&mut self, data_rows: usize) {
        self.blocks += 1;
        self.rows += data_rows as u64;
    }

    /// Counts the cells the anonymization of `input` newly suppressed.
    ///
    /// A cell counts when the output holds the sentinel and the input did
    /// not. The header is never counted.
    pub fn track_suppressed_cells(&mut self, input: &Block, output: &Block) {
        let suppressed = input
            .rows()
            .iter()
            .zip(output.rows())
            .flat_map(|(before, after)| before.iter().zip(after))
            .filter(|(before, after)| *after == NULL_SENTINEL && *before != NULL_SENTINEL)
            .count();

        self.suppressed_cells += suppressed as u64;
        self.total_cells += (input.data_row_count() * input.column_count()) as u64;
        self.anonymized_blocks += 1;
    }

    /// Fraction of suppressed cells over all anonymized blocks.
    ///
    /// `None` until the first block has been tracked.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction_suppressed(&self) -> Option<f64> {
        if self.anonymized_blocks == 0 {
            return None;
        }
        if self.total_cells == 0 {
            return Some(0.0);
        }
        Some(self.suppressed_cells as f64 / self.total_cells as f64)
    }

    /// Suppressed cells counted so far.
    pub fn suppressed_cells(&self) -> u64 {
        self.suppressed_cells
    }

    /// Data cells seen by the anonymization so far.
    pub fn total_cells(&self) -> u64 {
        self.total_cells
    }

    /// Records the risk result of one assessed block.
    pub fn track_risks(&mut self, result: RiskProfile, data_rows: usize) {
        self.risks.push((result, data_rows as u64));
    }

    /// Aggregate risk over all assessed blocks.
    ///
    /// The highest risk is the maximum of all results; average risk and
    /// records at risk are weighted by each block's row count. If every
    /// recorded block was empty both weighted values are zero.
    ///
    /// # Errors
    /// Returns [`DeidError::NoStatistics`] before the first block.
    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate_risks(&self) -> Result<RiskProfile> {
        if self.risks.is_empty() {
            return Err(DeidError::NoStatistics);
        }

        let highest_risk = self
            .risks
            .iter()
            .map(|(result, _)| result.highest_risk)
            .fold(f64::NEG_INFINITY, f64::max);
        let weight: u64 = self.risks.iter().map(|(_, rows)| rows).sum();
        if weight == 0 {
            return Ok(RiskProfile::new(highest_risk, 0.0, 0.0));
        }

        let weighted = |value: fn(&RiskProfile) -> f64| {
            self.risks
                .iter()
                .map(|(result, rows)| value(result) * *rows as f64)
                .sum::<f64>()
                / weight as f64
        };

        Ok(RiskProfile::new(
            highest_risk,
            weighted(|r| r.average_risk),
            weighted(|r| r.records_at_risk),
        ))
    }

    /// Snapshot of the run for reporting.
    pub fn report(&self, mode: Mode) -> RunReport {
        RunReport {
            run_id: self.run_id,
            mode,
            blocks_processed: self.blocks,
            rows_processed: self.rows,
            suppressed_cells: self.suppressed_cells,
            total_cells: self.total_cells,
            fraction_suppressed: self.fraction_suppressed(),
            aggregate_risk: self.aggregate_risks().ok(),
            started_at: self.started_at,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// End-of-stream summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier of the run
    pub run_id: Uuid,
    /// Mode the stream ran in
    pub mode: Mode,
    /// Blocks handed to an orchestrator
    pub blocks_processed: u64,
    /// Data rows handed to an orchestrator
    pub rows_processed: u64,
    /// Cells newly suppressed by anonymization
    pub suppressed_cells: u64,
    /// Data cells seen by anonymization
    pub total_cells: u64,
    /// `suppressed_cells / total_cells`, once a block was anonymized
    pub fraction_suppressed: Option<f64>,
    /// Weighted risk aggregate, once a block was assessed
    pub aggregate_risk: Option<RiskProfile>,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Logs the summary line for the run's mode.
    pub fn log_summary(&self) {
        match self.mode {
            Mode::Anonymize => match self.fraction_suppressed {
                Some(fraction) => tracing::info!(
                    run_id = %self.run_id,
                    blocks = self.blocks_processed,
                    rows = self.rows_processed,
                    elapsed_ms = self.elapsed_ms,
                    "Fraction of suppressed cells: {:.4}",
                    fraction
                ),
                None => tracing::info!("No block was anonymized"),
            },
            Mode::Assess => match self.aggregate_risk {
                Some(risk) => tracing::info!(
                    run_id = %self.run_id,
                    blocks = self.blocks_processed,
                    rows = self.rows_processed,
                    elapsed_ms = self.elapsed_ms,
                    "Aggregate risk: highest {:.4}, average {:.4}, records at risk {:.4}",
                    risk.highest_risk,
                    risk.average_risk,
                    risk.records_at_risk
                ),
                None => tracing::info!("No block was assessed"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Header;

    fn block(rows: &[[&str; 2]]) -> Block {
        Block::from_rows(
            Header::new(["sex", "zip"]),
            rows.iter()
                .map(|r| r.iter().map(|v| (*v).to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_fraction_before_any_block() {
        let stats = Statistics::new();
        assert_eq!(stats.fraction_suppressed(), None);
    }

    #[test]
    fn test_only_new_sentinels_count() {
        let mut stats = Statistics::new();
        let input = block(&[["M", NULL_SENTINEL], ["F", "4711"]]);
        let output = block(&[[NULL_SENTINEL, NULL_SENTINEL], ["F", "4711"]]);

        stats.track_suppressed_cells(&input, &output);

        assert_eq!(stats.suppressed_cells(), 1);
        assert_eq!(stats.total_cells(), 4);
        assert_eq!(stats.fraction_suppressed(), Some(0.25));
    }

    #[test]
    fn test_fraction_accumulates_across_blocks() {
        let mut stats = Statistics::new();
        let input = block(&[["M", "1"], ["F", "2"]]);
        stats.track_suppressed_cells(&input, &Block::suppressed(input.header().clone(), 2));
        stats.track_suppressed_cells(&input, &input);

        assert_eq!(stats.suppressed_cells(), 4);
        assert_eq!(stats.total_cells(), 8);
        assert_eq!(stats.fraction_suppressed(), Some(0.5));
    }

    #[test]
    fn test_empty_block_fraction_is_zero() {
        let mut stats = Statistics::new();
        let empty = block(&[]);
        stats.track_suppressed_cells(&empty, &empty);
        assert_eq!(stats.fraction_suppressed(), Some(0.0));
    }

    #[test]
    fn test_aggregate_without_blocks_fails() {
        let stats = Statistics::new();
        assert!(matches!(stats.aggregate_risks(), Err(DeidError::NoStatistics)));
    }

    #[test]
    fn test_aggregate_is_row_weighted() {
        let mut stats = Statistics::new();
        stats.track_risks(RiskProfile::new(0.2, 0.1, 0.0), 30);
        stats.track_risks(RiskProfile::new(0.5, 0.5, 0.4), 10);

        let aggregate = stats.aggregate_risks().unwrap();
        assert_eq!(aggregate.highest_risk, 0.5);
        assert!((aggregate.average_risk - 0.2).abs() < 1e-9);
        assert!((aggregate.records_at_risk - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_identical_results_are_kept_apart() {
        let mut stats = Statistics::new();
        let result = RiskProfile::new(0.2, 0.3, 0.1);
        stats.track_risks(result, 5);
        stats.track_risks(result, 15);

        let aggregate = stats.aggregate_risks().unwrap();
        assert!((aggregate.average_risk - 0.3).abs() < 1e-9);
        assert!((aggregate.records_at_risk - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_of_empty_blocks() {
        let mut stats = Statistics::new();
        stats.track_risks(RiskProfile::new(0.2, 0.0, 0.0), 0);
        let aggregate = stats.aggregate_risks().unwrap();
        assert_eq!(aggregate.highest_risk, 0.2);
        assert_eq!(aggregate.average_risk, 0.0);
    }

    #[test]
    fn test_report_counters() {
        let mut stats = Statistics::new();
        stats.record_block(8);
        stats.record_block(3);
        stats.track_risks(RiskProfile::new(0.2, 0.1, 0.0), 11);

        let report = stats.report(Mode::Assess);
        assert_eq!(report.blocks_processed, 2);
        assert_eq!(report.rows_processed, 11);
        assert!(report.aggregate_risk.is_some());
        assert_eq!(report.fraction_suppressed, None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "assess");
        assert_eq!(json["run_id"], stats.run_id().to_string());
    }
}
