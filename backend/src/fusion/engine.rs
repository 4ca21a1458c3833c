use shared::Category;
use std::collections::{BTreeMap, BTreeSet};

use super::rules::{ConflictRule, Source, CONFLICT_RULES, FUSION_TABLE};
use crate::config::Thresholds;
use crate::inference::{ClassifierId, EnsembleVerdicts};

pub type FusedScores = BTreeMap<Category, f32>;
pub type LabelSet = BTreeSet<Category>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FusionError {
    #[error("classifier {classifier} produced no '{label}' score")]
    MissingScore {
        classifier: ClassifierId,
        label: Category,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionOutcome {
    pub scores: FusedScores,
    pub labels: LabelSet,
    /// Labels that passed their threshold but were removed by a conflict rule.
    pub suppressed: Vec<Category>,
}

#[derive(Debug, Clone)]
pub struct FusionEngine {
    thresholds: Thresholds,
    conflict_rules: &'static [ConflictRule],
}

impl FusionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            conflict_rules: CONFLICT_RULES,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn fuse(&self, verdicts: &EnsembleVerdicts) -> Result<FusionOutcome, FusionError> {
        let scores = self.fuse_scores(verdicts)?;
        let passed = self.apply_thresholds(&scores);
        let (labels, suppressed) = self.resolve_conflicts(passed);

        if !suppressed.is_empty() {
            log::debug!("Suppressed conflicting labels: {:?}", suppressed);
        }

        Ok(FusionOutcome {
            scores,
            labels,
            suppressed,
        })
    }

    /// One score per category, built from the fixed source table.
    pub fn fuse_scores(&self, verdicts: &EnsembleVerdicts) -> Result<FusedScores, FusionError> {
        let lookup = |source: Source| {
            verdicts
                .get(source.classifier)
                .and_then(|v| v.score(source.label))
                .ok_or(FusionError::MissingScore {
                    classifier: source.classifier,
                    label: source.label,
                })
        };

        FUSION_TABLE
            .iter()
            .map(|rule| Ok((rule.category, rule.aggregation.evaluate(lookup)?)))
            .collect()
    }

    pub fn apply_thresholds(&self, scores: &FusedScores) -> LabelSet {
        scores
            .iter()
            .filter(|(category, score)| **score >= self.thresholds.get(**category))
            .map(|(category, _)| *category)
            .collect()
    }

    pub fn resolve_conflicts(&self, mut labels: LabelSet) -> (LabelSet, Vec<Category>) {
        let mut suppressed = Vec::new();
        for rule in self.conflict_rules {
            let triggered = rule.triggers.iter().all(|t| labels.contains(t));
            if triggered && labels.remove(&rule.suppressed) {
                suppressed.push(rule.suppressed);
            }
        }
        (labels, suppressed)
    }
}
