//! Anonymization orchestrator.
//!
//! Wraps one engine call per block. Infeasibility in any form is recovered
//! by emitting a block of the same shape filled with the null sentinel;
//! only a failing refinement pass is reported to the caller.

use std::collections::BTreeSet;

use crate::config::{RiskSettings, RuntimeSettings};
use crate::engine::{AnonymizationEngine, AnonymizationRequest, AttributeRole, Hierarchy};
use crate::error::BlockContext;
use crate::models::Block;
use crate::privacy::{AnonymizationParams, derive_params};
use crate::{DeidError, Result};

/// Runs blocks through an [`AnonymizationEngine`].
#[derive(Debug, Clone)]
pub struct Anonymizer<E> {
    engine: E,
    risk: RiskSettings,
    params: AnonymizationParams,
}

impl<E: AnonymizationEngine> Anonymizer<E> {
    /// Creates an orchestrator, deriving the engine parameters once.
    pub fn new(engine: E, risk: RiskSettings, runtime: &RuntimeSettings) -> Self {
        let params = derive_params(&risk, runtime);
        Self {
            engine,
            risk,
            params,
        }
    }

    /// Parameters handed to the engine for every block.
    pub fn params(&self) -> &AnonymizationParams {
        &self.params
    }

    /// One role per header column.
    ///
    /// Flagged quasi-identifiers get a flat hierarchy over the block's own
    /// distinct values; every other column is insensitive.
    pub fn attribute_roles(&self, block: &Block) -> Vec<AttributeRole> {
        let active: BTreeSet<&str> = self.risk.active_qis().collect();
        block
            .header()
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                if active.contains(column.as_str()) {
                    AttributeRole::QuasiIdentifying(Hierarchy::flat(
                        column.clone(),
                        block.distinct_values(index),
                    ))
                } else {
                    AttributeRole::Insensitive
                }
            })
            .collect()
    }

    /// Anonymizes one block.
    ///
    /// The returned block always has the input's header and data-row count.
    ///
    /// # Errors
    /// Returns [`DeidError::Refinement`] if the refinement pass fails.
    pub fn perform(&self, block: &Block) -> Result<Block> {
        let rows = block.data_row_count();
        if self.params.k > rows {
            tracing::warn!(
                "Class size {} exceeds the {} rows of the block, suppressing all cells",
                self.params.k,
                rows
            );
            return Ok(Self::fallback(block));
        }

        let request = AnonymizationRequest {
            block,
            attributes: self.attribute_roles(block),
            params: &self.params,
        };

        let outcome = match self.engine.anonymize(&request) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("No feasible anonymization for {} rows, suppressing all cells: {}", rows, e);
                return Ok(Self::fallback(block));
            }
        };

        let Some(mut output) = outcome.output else {
            tracing::warn!("Engine returned no output for {} rows, suppressing all cells", rows);
            return Ok(Self::fallback(block));
        };

        if outcome.optimizable {
            tracing::debug!(
                outliers = output.outliers.len(),
                target = self.params.target_outlier_fraction,
                "Refining anonymization result"
            );
            output = self
                .engine
                .optimize(&request, output, self.params.target_outlier_fraction)
                .map_err(|e| DeidError::refinement_failed(self.context(block), e))?;
        }

        if output.block.data_row_count() != rows
            || output.block.header() != block.header()
        {
            tracing::warn!(
                "Engine output has {} rows and {} columns, expected {} and {}; suppressing all cells",
                output.block.data_row_count(),
                output.block.column_count(),
                rows,
                block.column_count()
            );
            return Ok(Self::fallback(block));
        }

        Ok(output.block)
    }

    /// Reproduction context attached to fatal block errors.
    pub fn context(&self, block: &Block) -> BlockContext {
        BlockContext {
            data_rows: block.data_row_count(),
            quasi_identifiers: self.risk.configured_qis(),
            highest_risk: self.risk.highest_risk,
            average_risk: self.risk.average_risk,
            records_at_risk: self.risk.records_at_risk,
        }
    }

    fn fallback(block: &Block) -> Block {
        Block::suppressed(block.header().clone(), block.data_row_count())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::QuasiIdentifier;
    use crate::engine::{AnonymizationOutcome, EngineOutput, LocalSuppressionEngine};
    use crate::error::EngineError;
    use crate::models::{Header, NULL_SENTINEL};

    /// Engine double with a scripted answer.
    #[derive(Default)]
    struct ScriptedEngine {
        fail_anonymize: bool,
        no_output: bool,
        optimizable: bool,
        fail_optimize: bool,
        calls: Cell<usize>,
    }

    impl AnonymizationEngine for ScriptedEngine {
        fn anonymize(
            &self,
            request: &AnonymizationRequest<'_>,
        ) -> std::result::Result<AnonymizationOutcome, EngineError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail_anonymize {
                return Err(EngineError::Internal("solver crashed".to_string()));
            }
            let output = (!self.no_output).then(|| EngineOutput {
                block: request.block.clone(),
                levels: BTreeMap::new(),
                outliers: BTreeSet::new(),
            });
            Ok(AnonymizationOutcome {
                output,
                optimizable: self.optimizable,
            })
        }

        fn optimize(
            &self,
            _request: &AnonymizationRequest<'_>,
            output: EngineOutput,
            _target_outlier_fraction: f64,
        ) -> std::result::Result<EngineOutput, EngineError> {
            if self.fail_optimize {
                Err(EngineError::RollbackRequired("stale history".to_string()))
            } else {
                Ok(output)
            }
        }
    }

    fn risk() -> RiskSettings {
        RiskSettings::new()
            .with_highest_risk(0.5)
            .with_average_risk(1.0)
            .with_records_at_risk(0.0)
            .add_qi(QuasiIdentifier::new("sex"))
            .add_qi(QuasiIdentifier::new("note").with_qi(false))
    }

    fn block(rows: &[[&str; 3]]) -> Block {
        Block::from_rows(
            Header::new(["sex", "zip", "note"]),
            rows.iter()
                .map(|r| r.iter().map(|v| (*v).to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn all_suppressed(block: &Block) -> bool {
        block.rows().iter().flatten().all(|cell| cell == NULL_SENTINEL)
    }

    #[test]
    fn test_class_size_above_row_count_skips_engine() {
        let anonymizer = Anonymizer::new(ScriptedEngine::default(), risk(), &RuntimeSettings::new());
        let input = block(&[["M", "4711", "a"]]);

        let output = anonymizer.perform(&input).unwrap();

        assert_eq!(output.data_row_count(), 1);
        assert!(all_suppressed(&output));
        assert_eq!(output.header(), input.header());
        assert_eq!(anonymizer.engine.calls.get(), 0);
    }

    #[test]
    fn test_empty_block_yields_empty_output() {
        let anonymizer = Anonymizer::new(ScriptedEngine::default(), risk(), &RuntimeSettings::new());
        let output = anonymizer.perform(&block(&[])).unwrap();
        assert!(output.is_empty());
        assert_eq!(output.column_count(), 3);
    }

    #[test]
    fn test_engine_failure_falls_back() {
        let engine = ScriptedEngine {
            fail_anonymize: true,
            ..ScriptedEngine::default()
        };
        let anonymizer = Anonymizer::new(engine, risk(), &RuntimeSettings::new());
        let output = anonymizer
            .perform(&block(&[["M", "1", "a"], ["F", "2", "b"]]))
            .unwrap();
        assert_eq!(output.data_row_count(), 2);
        assert!(all_suppressed(&output));
    }

    #[test]
    fn test_missing_output_falls_back() {
        let engine = ScriptedEngine {
            no_output: true,
            ..ScriptedEngine::default()
        };
        let anonymizer = Anonymizer::new(engine, risk(), &RuntimeSettings::new());
        let output = anonymizer
            .perform(&block(&[["M", "1", "a"], ["F", "2", "b"]]))
            .unwrap();
        assert!(all_suppressed(&output));
    }

    #[test]
    fn test_refinement_failure_is_fatal() {
        let engine = ScriptedEngine {
            optimizable: true,
            fail_optimize: true,
            ..ScriptedEngine::default()
        };
        let anonymizer = Anonymizer::new(engine, risk(), &RuntimeSettings::new());
        let err = anonymizer
            .perform(&block(&[["M", "1", "a"], ["F", "2", "b"]]))
            .unwrap_err();

        match err {
            DeidError::Refinement { context, .. } => {
                assert_eq!(context.data_rows, 2);
                assert_eq!(context.quasi_identifiers, vec!["sex", "note"]);
                assert_eq!(context.highest_risk, 0.5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_attribute_roles_follow_flags() {
        let anonymizer = Anonymizer::new(ScriptedEngine::default(), risk(), &RuntimeSettings::new());
        let input = block(&[["M", "1", "a"], ["F", "1", "b"]]);
        let roles = anonymizer.attribute_roles(&input);

        assert_eq!(roles.len(), 3);
        match &roles[0] {
            AttributeRole::QuasiIdentifying(hierarchy) => {
                assert_eq!(hierarchy.column(), "sex");
                assert_eq!(hierarchy.len(), 2);
            }
            AttributeRole::Insensitive => panic!("sex should be quasi-identifying"),
        }
        assert_eq!(roles[1], AttributeRole::Insensitive);
        assert_eq!(roles[2], AttributeRole::Insensitive);
    }

    #[test]
    fn test_reference_engine_suppresses_unique_values() {
        let anonymizer = Anonymizer::new(
            LocalSuppressionEngine::new(),
            risk(),
            &RuntimeSettings::new().with_records_per_iteration(0.0),
        );
        let input = block(&[
            ["M", "1", "a"],
            ["M", "2", "b"],
            ["F", "3", "c"],
            ["F", "4", "d"],
            ["X", "5", "e"],
        ]);

        let output = anonymizer.perform(&input).unwrap();

        assert_eq!(output.data_row_count(), 5);
        assert_eq!(output.rows()[0][0], "M");
        assert_eq!(output.rows()[4][0], NULL_SENTINEL);
        // insensitive columns pass through
        assert_eq!(output.rows()[4][1], "5");
        assert_eq!(output.rows()[4][2], "e");
    }
}
