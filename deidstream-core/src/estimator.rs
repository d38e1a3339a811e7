//! Re-identification risk estimation.
//!
//! The orchestrator only relies on the [`RiskEstimator`] contract. The
//! bundled [`SampleRiskEstimator`] treats the block as the population, which
//! makes it a conservative upper bound for samples.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::Block;

/// Measured risk of one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskEstimate {
    /// Fraction of records whose risk exceeds the highest-risk ceiling
    pub records_at_risk: f64,
    /// Mean record risk
    pub average_risk: f64,
}

/// Contract of a risk estimator.
pub trait RiskEstimator {
    /// Estimates the risk of `block` over the given quasi-identifier columns.
    ///
    /// Cells equal to `null_sentinel` match any value of the same column.
    fn estimate(
        &self,
        block: &Block,
        quasi_identifiers: &[String],
        highest_risk: f64,
        null_sentinel: &str,
    ) -> Result<RiskEstimate, EngineError>;
}

/// Estimator based on the equivalence classes observed in the block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleRiskEstimator;

impl SampleRiskEstimator {
    /// Creates the estimator.
    pub fn new() -> Self {
        Self
    }
}

impl RiskEstimator for SampleRiskEstimator {
    #[allow(clippy::cast_precision_loss)]
    fn estimate(
        &self,
        block: &Block,
        quasi_identifiers: &[String],
        highest_risk: f64,
        null_sentinel: &str,
    ) -> Result<RiskEstimate, EngineError> {
        let header = block.header();
        let columns: Vec<usize> = quasi_identifiers
            .iter()
            .filter_map(|qi| header.index_of(qi))
            .collect();
        let rows = block.rows();
        if rows.is_empty() {
            return Ok(RiskEstimate {
                records_at_risk: 0.0,
                average_risk: 0.0,
            });
        }

        let mut keys = Vec::with_capacity(rows.len());
        let mut counts: HashMap<Vec<&str>, usize> = HashMap::new();
        for row in rows {
            let key = columns
                .iter()
                .map(|&c| row.get(c).map(String::as_str))
                .collect::<Option<Vec<&str>>>()
                .ok_or_else(|| {
                    EngineError::Internal("row is shorter than its header".to_string())
                })?;
            *counts.entry(key.clone()).or_default() += 1;
            keys.push(key);
        }

        let sizes = class_sizes(&counts, null_sentinel);

        let mut total_risk = 0.0;
        let mut at_risk = 0_usize;
        for key in &keys {
            let class_size = sizes.get(key).copied().unwrap_or(0);
            if class_size == 0 {
                return Err(EngineError::Internal(
                    "record does not match its own equivalence class".to_string(),
                ));
            }
            let risk = 1.0 / class_size as f64;
            total_risk += risk;
            if risk > highest_risk {
                at_risk += 1;
            }
        }

        let n = rows.len() as f64;
        let estimate = RiskEstimate {
            records_at_risk: at_risk as f64 / n,
            average_risk: total_risk / n,
        };
        tracing::trace!(
            rows = rows.len(),
            qis = columns.len(),
            records_at_risk = estimate.records_at_risk,
            average_risk = estimate.average_risk,
            "Estimated block risk"
        );
        Ok(estimate)
    }
}

/// Equivalence class size of every distinct key.
///
/// Keys without a sentinel cell only need the exact group plus the wildcard
/// groups matching them. Only wildcard keys are compared against every group.
fn class_sizes<'a>(
    counts: &HashMap<Vec<&'a str>, usize>,
    null_sentinel: &str,
) -> HashMap<Vec<&'a str>, usize> {
    let (wildcards, exact): (Vec<_>, Vec<_>) = counts
        .iter()
        .partition(|(key, _)| key.iter().any(|cell| *cell == null_sentinel));

    let matches = |a: &[&str], b: &[&str]| {
        a.iter()
            .zip(b)
            .all(|(x, y)| x == y || *x == null_sentinel || *y == null_sentinel)
    };

    let mut sizes = HashMap::with_capacity(counts.len());
    for (key, count) in &exact {
        let widened: usize = wildcards
            .iter()
            .filter(|(wild, _)| matches(key, wild))
            .map(|(_, n)| **n)
            .sum();
        sizes.insert((*key).clone(), **count + widened);
    }
    for (key, _) in &wildcards {
        let size: usize = counts
            .iter()
            .filter(|(other, _)| matches(key, other))
            .map(|(_, n)| *n)
            .sum();
        sizes.insert((*key).clone(), size);
    }
    sizes
}
