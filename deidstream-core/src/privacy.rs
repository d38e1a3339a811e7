//! Derivation of privacy-model parameters from risk thresholds.
//!
//! Turns the user's risk ceilings and runtime knobs into the constraint set,
//! suppression limit and search settings passed to the anonymization engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{RiskSettings, RuntimeSettings};

/// A constraint the anonymized output must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PrivacyModel {
    /// Every equivalence class holds at least `k` records
    KAnonymity { k: usize },
    /// The average re-identification risk stays at or below `threshold`
    AverageRisk { threshold: f64 },
    /// Coupled average, highest and records-at-risk constraint.
    ///
    /// The three thresholds are evaluated together by the engine's risk
    /// model and are not composable individually.
    CombinedRisk {
        average_risk: f64,
        highest_risk: f64,
        records_at_risk: f64,
    },
}

/// How the engine searches the generalization space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Exhaustive search, guaranteed optimal
    Optimal,
    /// Time-bounded approximate search
    Heuristic,
}

/// Objective the engine optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityObjective {
    /// Minimize the information lost by generalization and suppression
    MinimizeLoss,
}

/// Tuning of the engine's internal snapshot cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheTuning {
    /// Maximum snapshot size relative to the dataset
    pub snapshot_size_dataset: f64,
    /// Maximum snapshot size relative to the previous snapshot
    pub snapshot_size_snapshot: f64,
    /// Maximum number of snapshots in the history
    pub history_size: usize,
}

/// Everything the engine needs besides the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationParams {
    /// Minimal equivalence class size derived from the highest-risk ceiling
    pub k: usize,
    /// Constraints to satisfy
    pub models: Vec<PrivacyModel>,
    /// Maximum fraction of records eligible for suppression
    pub suppression_limit: f64,
    /// Search strategy
    pub search: SearchMode,
    /// Time budget per heuristic search step
    pub time_budget: Duration,
    /// Cache tuning
    pub cache: CacheTuning,
    /// Optimization objective
    pub objective: QualityObjective,
    /// Outlier fraction targeted by the refinement pass
    pub target_outlier_fraction: f64,
}

/// Relative discretization tolerance applied when rounding `1/h`.
const SIZE_TOLERANCE: f64 = 0.01;

/// Returns the minimal class size for the given risk threshold.
///
/// Computes `floor(1/h)` and bumps it by one unless `1/floor` lies within
/// one percent of `h`, so thresholds that are almost an exact reciprocal do
/// not land on the wrong side of the floor. Non-positive thresholds yield
/// `usize::MAX`, which no block can satisfy.
///
/// # Example
/// ```rust
/// use deidstream_core::privacy::size_threshold;
///
/// assert_eq!(size_threshold(0.2), 5);
/// assert_eq!(size_threshold(0.3), 4);
/// assert_eq!(size_threshold(1.0), 1);
/// ```
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn size_threshold(risk_threshold: f64) -> usize {
    if risk_threshold.is_nan() || risk_threshold <= 0.0 {
        return usize::MAX;
    }
    let size = 1.0 / risk_threshold;
    let mut floor = size.floor();
    if (1.0 / floor) - (1.0 / size) >= SIZE_TOLERANCE * risk_threshold {
        floor += 1.0;
    }
    floor as usize
}

/// Builds the constraint set for the given thresholds and class size.
pub fn privacy_models(risk: &RiskSettings, k: usize) -> Vec<PrivacyModel> {
    let thresholds = risk.thresholds();
    let mut models = Vec::new();

    if thresholds.records_at_risk_disabled() {
        if k != 1 {
            models.push(PrivacyModel::KAnonymity { k });
        }
        if !thresholds.average_risk_disabled() {
            models.push(PrivacyModel::AverageRisk {
                threshold: thresholds.average_risk,
            });
        }
    } else {
        models.push(PrivacyModel::CombinedRisk {
            average_risk: thresholds.average_risk,
            highest_risk: thresholds.highest_risk,
            records_at_risk: thresholds.records_at_risk,
        });
    }

    models
}

/// Search mode for the configured number of quasi-identifiers.
///
/// Every configured entry counts, including ones whose flag is off.
pub fn search_mode(risk: &RiskSettings, runtime: &RuntimeSettings) -> SearchMode {
    if risk.qis.len() > runtime.max_qis_optimal {
        SearchMode::Heuristic
    } else {
        SearchMode::Optimal
    }
}

/// Derives the full engine parameter set.
pub fn derive_params(risk: &RiskSettings, runtime: &RuntimeSettings) -> AnonymizationParams {
    let k = size_threshold(risk.highest_risk);
    let params = AnonymizationParams {
        k,
        models: privacy_models(risk, k),
        suppression_limit: 1.0 - runtime.records_per_iteration,
        search: search_mode(risk, runtime),
        time_budget: runtime.time_budget(),
        cache: CacheTuning {
            snapshot_size_dataset: runtime.snapshot_size_dataset,
            snapshot_size_snapshot: runtime.snapshot_size_snapshot,
            history_size: runtime.cache_size,
        },
        objective: QualityObjective::MinimizeLoss,
        target_outlier_fraction: runtime.records_per_iteration,
    };

    tracing::debug!(
        k = params.k,
        models = params.models.len(),
        suppression_limit = params.suppression_limit,
        search = ?params.search,
        "Derived anonymization parameters"
    );

    params
}
