//! Risk assessment orchestrator.
//!
//! Measures a block's re-identification risk and decides which output
//! channel it belongs to. The block itself is never modified.

use serde::{Deserialize, Serialize};

use crate::config::{RiskProfile, RiskSettings};
use crate::error::BlockContext;
use crate::estimator::RiskEstimator;
use crate::models::{Block, NULL_SENTINEL};
use crate::{DeidError, Result};

/// Named emission channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Compliant or anonymized records
    Main,
    /// Non-compliant records
    Error,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Main => write!(f, "main"),
            Channel::Error => write!(f, "error"),
        }
    }
}

/// Outcome of assessing one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    /// Measured risk; `highest_risk` is the configured ceiling
    pub result: RiskProfile,
    /// Where the block goes
    pub channel: Channel,
}

/// Runs blocks through a [`RiskEstimator`].
#[derive(Debug, Clone)]
pub struct RiskAssessment<R> {
    estimator: R,
    risk: RiskSettings,
    quasi_identifiers: Vec<String>,
}

impl<R: RiskEstimator> RiskAssessment<R> {
    /// Creates an orchestrator for the configured thresholds.
    pub fn new(estimator: R, risk: RiskSettings) -> Self {
        let quasi_identifiers = risk.active_qis().map(str::to_string).collect();
        Self {
            estimator,
            risk,
            quasi_identifiers,
        }
    }

    /// Computes the risk result of a block.
    ///
    /// Only the average risk and the records at risk are measured. The
    /// highest risk is reported as the configured ceiling.
    ///
    /// # Errors
    /// Returns [`DeidError::Estimation`] if the estimator fails.
    pub fn calculate(&self, block: &Block) -> Result<RiskProfile> {
        let estimate = self
            .estimator
            .estimate(
                block,
                &self.quasi_identifiers,
                self.risk.highest_risk,
                NULL_SENTINEL,
            )
            .map_err(|e| DeidError::estimation_failed(self.context(block), e))?;

        Ok(RiskProfile::new(
            self.risk.highest_risk,
            estimate.average_risk,
            estimate.records_at_risk,
        ))
    }

    /// Computes the risk result and routes the block.
    pub fn assess(&self, block: &Block) -> Result<Assessment> {
        let result = self.calculate(block)?;
        let channel = if result.satisfies(&self.risk.thresholds()) {
            Channel::Main
        } else {
            Channel::Error
        };

        tracing::debug!(
            rows = block.data_row_count(),
            average_risk = result.average_risk,
            records_at_risk = result.records_at_risk,
            %channel,
            "Assessed block"
        );

        Ok(Assessment { result, channel })
    }

    fn context(&self, block: &Block) -> BlockContext {
        BlockContext {
            data_rows: block.data_row_count(),
            quasi_identifiers: self.risk.configured_qis(),
            highest_risk: self.risk.highest_risk,
            average_risk: self.risk.average_risk,
            records_at_risk: self.risk.records_at_risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuasiIdentifier;
    use crate::error::EngineError;
    use crate::estimator::{RiskEstimate, SampleRiskEstimator};
    use crate::models::Header;

    struct FixedEstimator(Option<RiskEstimate>);

    impl RiskEstimator for FixedEstimator {
        fn estimate(
            &self,
            _block: &Block,
            _quasi_identifiers: &[String],
            _highest_risk: f64,
            null_sentinel: &str,
        ) -> std::result::Result<RiskEstimate, EngineError> {
            assert_eq!(null_sentinel, NULL_SENTINEL);
            self.0
                .ok_or_else(|| EngineError::Internal("model did not converge".to_string()))
        }
    }

    fn risk() -> RiskSettings {
        RiskSettings::new()
            .with_highest_risk(0.2)
            .with_average_risk(0.05)
            .with_records_at_risk(0.01)
            .add_qi(QuasiIdentifier::new("zip"))
    }

    fn block() -> Block {
        Block::from_rows(
            Header::new(["zip"]),
            vec![vec!["4711".to_string()], vec!["4712".to_string()]],
        )
        .unwrap()
    }

    #[test]
    fn test_highest_risk_echoes_ceiling() {
        let estimate = RiskEstimate {
            records_at_risk: 0.0,
            average_risk: 0.01,
        };
        let assessment = RiskAssessment::new(FixedEstimator(Some(estimate)), risk());
        let result = assessment.calculate(&block()).unwrap();

        assert_eq!(result.highest_risk, 0.2);
        assert_eq!(result.average_risk, 0.01);
        assert_eq!(result.records_at_risk, 0.0);
    }

    #[test]
    fn test_compliant_block_goes_to_main() {
        let estimate = RiskEstimate {
            records_at_risk: 0.01,
            average_risk: 0.05,
        };
        let assessment = RiskAssessment::new(FixedEstimator(Some(estimate)), risk());
        assert_eq!(assessment.assess(&block()).unwrap().channel, Channel::Main);
    }

    #[test]
    fn test_non_compliant_block_goes_to_error() {
        let estimate = RiskEstimate {
            records_at_risk: 0.5,
            average_risk: 0.01,
        };
        let assessment = RiskAssessment::new(FixedEstimator(Some(estimate)), risk());
        assert_eq!(assessment.assess(&block()).unwrap().channel, Channel::Error);

        let estimate = RiskEstimate {
            records_at_risk: 0.0,
            average_risk: 0.06,
        };
        let assessment = RiskAssessment::new(FixedEstimator(Some(estimate)), risk());
        assert_eq!(assessment.assess(&block()).unwrap().channel, Channel::Error);
    }

    #[test]
    fn test_estimator_failure_carries_context() {
        let assessment = RiskAssessment::new(FixedEstimator(None), risk());
        let err = assessment.assess(&block()).unwrap_err();
        match err {
            DeidError::Estimation { context, .. } => {
                assert_eq!(context.data_rows, 2);
                assert_eq!(context.quasi_identifiers, vec!["zip"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sample_estimator_unique_block() {
        let assessment = RiskAssessment::new(SampleRiskEstimator::new(), risk());
        let assessment = assessment.assess(&block()).unwrap();
        assert_eq!(assessment.result.records_at_risk, 1.0);
        assert_eq!(assessment.result.average_risk, 1.0);
        assert_eq!(assessment.channel, Channel::Error);
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Main.to_string(), "main");
        assert_eq!(Channel::Error.to_string(), "error");
    }
}
