//! Reference anonymization engine.
//!
//! Works on flat hierarchies, so each quasi-identifier column is either kept
//! as is or generalized completely. The search walks that lattice (every
//! node when optimal search is requested, greedily otherwise), suppresses
//! the records of equivalence classes that violate the privacy models, and
//! keeps the node that changes the fewest quasi-identifier cells while
//! staying within the suppression limit.
//!
//! Refinement locally recodes suppressed records: one more column at a time
//! is generalized for them only, and groups that now satisfy the models are
//! put back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use super::{AnonymizationEngine, AnonymizationOutcome, AnonymizationRequest, EngineOutput, Hierarchy};
use crate::error::EngineError;
use crate::models::{Block, NULL_SENTINEL, Row};
use crate::privacy::{PrivacyModel, SearchMode};

/// Above this many quasi-identifiers the lattice is never enumerated.
const MAX_EXHAUSTIVE_QIS: usize = 20;

/// Engine generalizing whole columns and suppressing outlier records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSuppressionEngine;

impl LocalSuppressionEngine {
    /// Creates the engine.
    pub fn new() -> Self {
        Self
    }
}

/// One evaluated lattice node.
#[derive(Debug, Clone)]
struct Candidate {
    generalized: Vec<bool>,
    outliers: BTreeSet<usize>,
    loss: f64,
    feasible: bool,
}

impl Candidate {
    fn generalized_count(&self) -> usize {
        self.generalized.iter().filter(|g| **g).count()
    }

    fn better_than(&self, other: &Candidate) -> bool {
        (self.loss, self.generalized_count()) < (other.loss, other.generalized_count())
    }
}

struct Lattice<'r> {
    rows: &'r [Row],
    qis: Vec<(usize, &'r Hierarchy)>,
    models: &'r [PrivacyModel],
    suppression_limit: f64,
}

#[allow(clippy::cast_precision_loss)]
fn fraction(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn class_risk(size: usize) -> f64 {
    if size == 0 { 1.0 } else { 1.0 / size as f64 }
}

fn class_key<'a>(
    qis: &[(usize, &'a Hierarchy)],
    row: &'a [String],
    generalized: &[bool],
) -> Result<Vec<&'a str>, EngineError> {
    qis.iter()
        .zip(generalized)
        .map(|((index, hierarchy), &generalize)| {
            let value = row
                .get(*index)
                .map(String::as_str)
                .ok_or_else(|| EngineError::Internal(format!("row has no column {}", index)))?;
            if generalize {
                hierarchy.generalize(value).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "value not covered by the hierarchy of '{}'",
                        hierarchy.column()
                    ))
                })
            } else {
                Ok(value)
            }
        })
        .collect()
}

/// Whether an equivalence class of `size` records passes the class-level models.
fn class_allowed(models: &[PrivacyModel], size: usize) -> bool {
    models.iter().all(|model| match *model {
        PrivacyModel::KAnonymity { k } => size >= k,
        PrivacyModel::CombinedRisk { highest_risk, .. } => class_risk(size) <= highest_risk,
        PrivacyModel::AverageRisk { .. } => true,
    })
}

/// Whether the average risk of the retained records passes the dataset-level models.
fn average_allowed(models: &[PrivacyModel], average: f64) -> bool {
    models.iter().all(|model| match *model {
        PrivacyModel::AverageRisk { threshold } => average <= threshold,
        PrivacyModel::CombinedRisk { average_risk, .. } => average <= average_risk,
        PrivacyModel::KAnonymity { .. } => true,
    })
}

impl<'r> Lattice<'r> {
    fn new(request: &'r AnonymizationRequest<'_>) -> Self {
        Self {
            rows: request.block.rows(),
            qis: request.quasi_identifiers(),
            models: &request.params.models,
            suppression_limit: request.params.suppression_limit,
        }
    }

    fn width(&self) -> usize {
        self.qis.len()
    }

    fn evaluate(&self, generalized: Vec<bool>) -> Result<Candidate, EngineError> {
        let n = self.rows.len();
        let mut classes: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
        for (position, row) in self.rows.iter().enumerate() {
            classes
                .entry(class_key(&self.qis, row, &generalized)?)
                .or_default()
                .push(position);
        }

        let mut outliers = BTreeSet::new();
        for model in self.models {
            match *model {
                PrivacyModel::KAnonymity { k } => {
                    for members in classes.values().filter(|m| m.len() < k) {
                        outliers.extend(members.iter().copied());
                    }
                }
                PrivacyModel::CombinedRisk {
                    highest_risk,
                    records_at_risk,
                    ..
                } => {
                    let at_risk: Vec<usize> = classes
                        .values()
                        .filter(|m| class_risk(m.len()) > highest_risk)
                        .flatten()
                        .copied()
                        .collect();
                    if fraction(at_risk.len(), n) > records_at_risk {
                        outliers.extend(at_risk);
                    }
                }
                PrivacyModel::AverageRisk { .. } => {}
            }
        }

        // Outliers always cover whole classes, so one member decides.
        let retained = n.saturating_sub(outliers.len());
        let retained_classes = classes
            .values()
            .filter(|m| m.first().is_some_and(|r| !outliers.contains(r)))
            .count();
        let average = fraction(retained_classes, retained);

        let feasible = fraction(outliers.len(), n) <= self.suppression_limit
            && average_allowed(self.models, average);
        let loss = self.loss(&generalized, &outliers);

        Ok(Candidate {
            generalized,
            outliers,
            loss,
            feasible,
        })
    }

    /// Fraction of quasi-identifier cells whose value is lost.
    fn loss(&self, generalized: &[bool], outliers: &BTreeSet<usize>) -> f64 {
        let mut changed = 0_usize;
        for (position, row) in self.rows.iter().enumerate() {
            let suppressed = outliers.contains(&position);
            for ((index, _), &generalize) in self.qis.iter().zip(generalized) {
                if (suppressed || generalize)
                    && row.get(*index).is_some_and(|v| v != NULL_SENTINEL)
                {
                    changed += 1;
                }
            }
        }
        fraction(changed, self.rows.len() * self.width())
    }

    fn exhaustive(&self) -> Result<Option<Candidate>, EngineError> {
        let width = self.width();
        let mut best: Option<Candidate> = None;
        for mask in 0..(1_u64 << width) {
            let generalized = (0..width).map(|bit| (mask >> bit) & 1 == 1).collect();
            let candidate = self.evaluate(generalized)?;
            if candidate.feasible && best.as_ref().is_none_or(|b| candidate.better_than(b)) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    fn greedy(&self, deadline: Option<Instant>) -> Result<Option<Candidate>, EngineError> {
        let width = self.width();
        let mut current = self.evaluate(vec![false; width])?;

        while !current.feasible {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::debug!("Heuristic search budget exhausted, trying full generalization");
                let top = self.evaluate(vec![true; width])?;
                return Ok(top.feasible.then_some(top));
            }

            let mut next: Option<Candidate> = None;
            for bit in (0..width).filter(|b| !current.generalized[*b]) {
                let mut generalized = current.generalized.clone();
                generalized[bit] = true;
                let candidate = self.evaluate(generalized)?;
                let improves = next.as_ref().is_none_or(|n| {
                    (!candidate.feasible, candidate.outliers.len(), candidate.loss)
                        < (!n.feasible, n.outliers.len(), n.loss)
                });
                if improves {
                    next = Some(candidate);
                }
            }

            match next {
                Some(candidate) => current = candidate,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    fn render(&self, header: &crate::models::Header, candidate: &Candidate) -> Result<EngineOutput, EngineError> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let suppressed = candidate.outliers.contains(&position);
            let mut out = row.clone();
            for ((index, hierarchy), &generalize) in self.qis.iter().zip(&candidate.generalized) {
                let Some(cell) = out.get_mut(*index) else {
                    continue;
                };
                if suppressed {
                    *cell = NULL_SENTINEL.to_string();
                } else if generalize {
                    let value = hierarchy.generalize(cell).map(str::to_string).ok_or_else(|| {
                        EngineError::Internal(format!(
                            "value not covered by the hierarchy of '{}'",
                            hierarchy.column()
                        ))
                    })?;
                    *cell = value;
                }
            }
            rows.push(out);
        }

        let block = Block::from_rows(header.clone(), rows)
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        let levels = self
            .qis
            .iter()
            .zip(&candidate.generalized)
            .map(|((index, _), &generalize)| (*index, usize::from(generalize)))
            .collect();

        Ok(EngineOutput {
            block,
            levels,
            outliers: candidate.outliers.clone(),
        })
    }

    /// Average risk over the retained rows of an output.
    fn output_average(&self, rows: &[Row], outliers: &BTreeSet<usize>) -> f64 {
        let mut classes: HashMap<Vec<&str>, usize> = HashMap::new();
        let mut retained = 0_usize;
        for (position, row) in rows.iter().enumerate() {
            if outliers.contains(&position) {
                continue;
            }
            let key: Vec<&str> = self
                .qis
                .iter()
                .filter_map(|(index, _)| row.get(*index).map(String::as_str))
                .collect();
            *classes.entry(key).or_default() += 1;
            retained += 1;
        }
        fraction(classes.len(), retained)
    }
}

impl AnonymizationEngine for LocalSuppressionEngine {
    fn anonymize(
        &self,
        request: &AnonymizationRequest<'_>,
    ) -> Result<AnonymizationOutcome, EngineError> {
        let lattice = Lattice::new(request);
        let params = request.params;

        tracing::trace!(
            history_size = params.cache.history_size,
            snapshot_size_dataset = params.cache.snapshot_size_dataset,
            "Starting lattice search over {} quasi-identifiers",
            lattice.width()
        );

        let exhaustive =
            params.search == SearchMode::Optimal && lattice.width() <= MAX_EXHAUSTIVE_QIS;
        if params.search == SearchMode::Optimal && !exhaustive {
            tracing::warn!(
                "{} quasi-identifiers are too many for exhaustive search, using heuristic search",
                lattice.width()
            );
        }

        let best = if exhaustive {
            lattice.exhaustive()?
        } else {
            lattice.greedy(Instant::now().checked_add(params.time_budget))?
        };

        let Some(best) = best else {
            return Err(EngineError::Infeasible(format!(
                "no generalization of {} quasi-identifiers satisfies {} privacy models",
                lattice.width(),
                params.models.len()
            )));
        };

        let optimizable = !best.outliers.is_empty();
        let output = lattice.render(request.block.header(), &best)?;
        Ok(AnonymizationOutcome {
            output: Some(output),
            optimizable,
        })
    }

    fn optimize(
        &self,
        request: &AnonymizationRequest<'_>,
        output: EngineOutput,
        target_outlier_fraction: f64,
    ) -> Result<EngineOutput, EngineError> {
        let n = request.block.data_row_count();
        if output.block.data_row_count() != n
            || output.block.column_count() != request.block.column_count()
        {
            return Err(EngineError::RollbackRequired(
                "output does not belong to the request's block".to_string(),
            ));
        }

        let lattice = Lattice::new(request);
        let mut generalized: Vec<bool> = lattice
            .qis
            .iter()
            .map(|(index, _)| output.levels.get(index).copied().unwrap_or(0) > 0)
            .collect();
        let pending: Vec<usize> = (0..generalized.len())
            .filter(|position| !generalized[*position])
            .collect();

        let EngineOutput {
            block,
            levels,
            mut outliers,
        } = output;
        let (header, mut rows) = block.into_parts();

        for position in pending {
            if fraction(outliers.len(), n) <= target_outlier_fraction {
                break;
            }
            generalized[position] = true;

            let mut groups: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
            for &row in &outliers {
                let source = lattice.rows.get(row).ok_or_else(|| {
                    EngineError::RollbackRequired(format!("outlier row {} out of range", row))
                })?;
                groups
                    .entry(class_key(&lattice.qis, source, &generalized)?)
                    .or_default()
                    .push(row);
            }

            let snapshot = (rows.clone(), outliers.clone());
            for (key, members) in groups {
                if !class_allowed(lattice.models, members.len()) {
                    continue;
                }
                for row in members {
                    if let Some(target) = rows.get_mut(row) {
                        for ((index, _), value) in lattice.qis.iter().zip(&key) {
                            if let Some(cell) = target.get_mut(*index) {
                                *cell = (*value).to_string();
                            }
                        }
                    }
                    outliers.remove(&row);
                }
            }

            let average = lattice.output_average(&rows, &outliers);
            if !average_allowed(lattice.models, average) {
                tracing::debug!(
                    "Local recoding step would raise average risk to {:.4}, keeping previous state",
                    average
                );
                (rows, outliers) = snapshot;
                break;
            }
        }

        let block = Block::from_rows(header, rows)
            .map_err(|e| EngineError::RollbackRequired(e.to_string()))?;
        Ok(EngineOutput {
            block,
            levels,
            outliers,
        })
    }
}
