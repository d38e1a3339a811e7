//! Anonymization engine contract.
//!
//! The engine that searches for a generalization/suppression solution is an
//! external collaborator. This module defines what the orchestrator hands to
//! it and what it expects back:
//! - an [`AnonymizationRequest`] with the block, one [`AttributeRole`] per
//!   column and the derived [`AnonymizationParams`]
//! - an [`AnonymizationOutcome`] carrying an optional [`EngineOutput`] handle
//!   and whether that output can be refined further
//!
//! [`LocalSuppressionEngine`] is the engine shipped with the crate. Any other
//! implementation can be plugged in through the [`AnonymizationEngine`] trait.

mod suppression;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::EngineError;
use crate::models::{Block, NULL_SENTINEL};
use crate::privacy::AnonymizationParams;

pub use suppression::LocalSuppressionEngine;

/// Value-to-generalization mapping for one quasi-identifier column.
///
/// Hierarchies built here are flat: every observed value generalizes
/// directly to [`NULL_SENTINEL`], which is enough to express cell
/// suppression without an external taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    column: String,
    levels: BTreeMap<String, String>,
}

impl Hierarchy {
    /// Builds a flat two-level hierarchy over the given values.
    pub fn flat<'a>(column: impl Into<String>, values: impl IntoIterator<Item = &'a str>) -> Self {
        let levels = values
            .into_iter()
            .map(|value| (value.to_string(), NULL_SENTINEL.to_string()))
            .collect();
        Self {
            column: column.into(),
            levels,
        }
    }

    /// Column this hierarchy belongs to.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Generalized form of a value, if the value is known.
    pub fn generalize(&self, value: &str) -> Option<&str> {
        self.levels.get(value).map(String::as_str)
    }

    /// Number of distinct values covered.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True if no value is covered.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Disclosure role of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRole {
    /// Carries no disclosure risk; passed through unchanged
    Insensitive,
    /// Takes part in re-identification; may be generalized via the hierarchy
    QuasiIdentifying(Hierarchy),
}

/// Input of one anonymization run.
#[derive(Debug, Clone)]
pub struct AnonymizationRequest<'a> {
    /// Block to anonymize
    pub block: &'a Block,
    /// One role per header column, in header order
    pub attributes: Vec<AttributeRole>,
    /// Constraints, suppression limit and search settings
    pub params: &'a AnonymizationParams,
}

impl AnonymizationRequest<'_> {
    /// Column indices with their hierarchies, for quasi-identifying columns.
    pub fn quasi_identifiers(&self) -> Vec<(usize, &Hierarchy)> {
        self.attributes
            .iter()
            .enumerate()
            .filter_map(|(index, role)| match role {
                AttributeRole::QuasiIdentifying(hierarchy) => Some((index, hierarchy)),
                AttributeRole::Insensitive => None,
            })
            .collect()
    }
}

/// Handle on a transformed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// The transformed block, same shape as the input
    pub block: Block,
    /// Generalization level applied per quasi-identifier column index
    pub levels: BTreeMap<usize, usize>,
    /// Data row indices suppressed as outliers
    pub outliers: BTreeSet<usize>,
}

/// Result of the initial anonymization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationOutcome {
    /// Transformed output, if the engine produced one
    pub output: Option<EngineOutput>,
    /// Whether the output is eligible for a refinement pass
    pub optimizable: bool,
}

/// Contract of an anonymization engine.
///
/// # Errors
/// A failing [`anonymize`](Self::anonymize) is treated by the orchestrator
/// like infeasibility. A failing [`optimize`](Self::optimize) is fatal for
/// the block, since the output state can no longer be trusted.
pub trait AnonymizationEngine {
    /// Searches for a transformation satisfying the request's constraints.
    fn anonymize(
        &self,
        request: &AnonymizationRequest<'_>,
    ) -> Result<AnonymizationOutcome, EngineError>;

    /// Refines an output produced for `request`, targeting the given
    /// fraction of outliers.
    fn optimize(
        &self,
        request: &AnonymizationRequest<'_>,
        output: EngineOutput,
        target_outlier_fraction: f64,
    ) -> Result<EngineOutput, EngineError>;
}
