//! Risk thresholds and quasi-identifier configuration.

use serde::{Deserialize, Serialize};

use super::ConfigValidationError;

/// Default highest risk per record.
pub const DEFAULT_HIGHEST_RISK: f64 = 0.2;
/// Default average risk.
pub const DEFAULT_AVERAGE_RISK: f64 = 0.05;
/// Default fraction of records at risk.
pub const DEFAULT_RECORDS_AT_RISK: f64 = 0.01;

/// Three re-identification risk probabilities.
///
/// Serves both as a set of configured ceilings and as the shape of a
/// computed risk result, so one can be checked against the other with
/// [`RiskProfile::satisfies`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Highest risk of any single record
    pub highest_risk: f64,
    /// Average risk over all records; 1.0 disables the constraint
    pub average_risk: f64,
    /// Fraction of records above the highest-risk ceiling; 0.0 disables it
    pub records_at_risk: f64,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            highest_risk: DEFAULT_HIGHEST_RISK,
            average_risk: DEFAULT_AVERAGE_RISK,
            records_at_risk: DEFAULT_RECORDS_AT_RISK,
        }
    }
}

impl RiskProfile {
    /// Creates a risk profile.
    pub fn new(highest_risk: f64, average_risk: f64, records_at_risk: f64) -> Self {
        Self {
            highest_risk,
            average_risk,
            records_at_risk,
        }
    }

    /// Returns whether this result stays within the given ceilings.
    ///
    /// All three components must be at or below their ceiling.
    pub fn satisfies(&self, ceilings: &RiskProfile) -> bool {
        self.records_at_risk <= ceilings.records_at_risk
            && self.average_risk <= ceilings.average_risk
            && self.highest_risk <= ceilings.highest_risk
    }

    /// True if the average-risk constraint is switched off.
    #[allow(clippy::float_cmp)]
    pub fn average_risk_disabled(&self) -> bool {
        self.average_risk == 1.0
    }

    /// True if the records-at-risk constraint is switched off.
    #[allow(clippy::float_cmp)]
    pub fn records_at_risk_disabled(&self) -> bool {
        self.records_at_risk == 0.0
    }
}

/// A column that may take part in re-identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuasiIdentifier {
    /// Column name in the input schema
    pub field: String,
    /// Whether the column is treated as a quasi-identifier
    #[serde(default = "default_true")]
    pub qi: bool,
}

fn default_true() -> bool {
    true
}

impl QuasiIdentifier {
    /// Creates an active quasi-identifier entry.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            qi: true,
        }
    }

    /// Builder method to enable/disable the entry.
    pub fn with_qi(mut self, qi: bool) -> Self {
        self.qi = qi;
        self
    }
}

/// Risk thresholds plus the quasi-identifier list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Highest allowed risk per record
    pub highest_risk: f64,
    /// Highest allowed average risk
    pub average_risk: f64,
    /// Highest allowed fraction of records at risk
    pub records_at_risk: f64,
    /// Quasi-identifier entries
    pub qis: Vec<QuasiIdentifier>,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            highest_risk: DEFAULT_HIGHEST_RISK,
            average_risk: DEFAULT_AVERAGE_RISK,
            records_at_risk: DEFAULT_RECORDS_AT_RISK,
            qis: Vec::new(),
        }
    }
}

impl RiskSettings {
    /// Creates risk settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the highest-risk ceiling.
    pub fn with_highest_risk(mut self, threshold: f64) -> Self {
        self.highest_risk = clamp_probability("highest_risk", threshold);
        self
    }

    /// Builder method to set the average-risk ceiling.
    pub fn with_average_risk(mut self, threshold: f64) -> Self {
        self.average_risk = clamp_probability("average_risk", threshold);
        self
    }

    /// Builder method to set the records-at-risk ceiling.
    pub fn with_records_at_risk(mut self, threshold: f64) -> Self {
        self.records_at_risk = clamp_probability("records_at_risk", threshold);
        self
    }

    /// Builder method to replace the quasi-identifier list.
    pub fn with_qis(mut self, qis: Vec<QuasiIdentifier>) -> Self {
        self.qis = qis;
        self
    }

    /// Adds a quasi-identifier entry.
    pub fn add_qi(mut self, qi: QuasiIdentifier) -> Self {
        self.qis.push(qi);
        self
    }

    /// The configured thresholds as a profile.
    pub fn thresholds(&self) -> RiskProfile {
        RiskProfile::new(self.highest_risk, self.average_risk, self.records_at_risk)
    }

    /// Names of the entries flagged as quasi-identifiers.
    pub fn active_qis(&self) -> impl Iterator<Item = &str> {
        self.qis.iter().filter(|q| q.qi).map(|q| q.field.as_str())
    }

    /// Names of every configured entry, flagged or not.
    pub fn configured_qis(&self) -> Vec<String> {
        self.qis.iter().map(|q| q.field.clone()).collect()
    }

    /// Validates the thresholds.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.highest_risk > 0.0 && self.highest_risk <= 1.0) {
            return Err(ConfigValidationError::InvalidHighestRisk(self.highest_risk));
        }
        if !(0.0..=1.0).contains(&self.average_risk) {
            return Err(ConfigValidationError::InvalidAverageRisk(self.average_risk));
        }
        if !(0.0..=1.0).contains(&self.records_at_risk) {
            return Err(ConfigValidationError::InvalidRecordsAtRisk(
                self.records_at_risk,
            ));
        }
        if let Some(empty) = self.qis.iter().find(|q| q.field.trim().is_empty()) {
            return Err(ConfigValidationError::EmptyQuasiIdentifier(
                empty.field.clone(),
            ));
        }
        Ok(())
    }
}

fn clamp_probability(name: &str, value: f64) -> f64 {
    if !(0.0..=1.0).contains(&value) {
        tracing::warn!("{} {} clamped to valid range [0.0, 1.0]", name, value);
    }
    value.clamp(0.0, 1.0)
}
