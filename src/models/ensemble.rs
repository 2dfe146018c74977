//! Weighted ensemble combining constituent model scores into one risk verdict.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::scoring::ScoringModel;
use crate::types::decision::{ModelContribution, RiskAssessment, RiskLevel};
use crate::types::features::FeatureVector;
use crate::types::transaction::EventContext;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Risk level thresholds for classifying the aggregated score.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RiskThresholds {
    /// Scores at or above this are medium risk
    pub medium: f64,
    /// Scores at or above this are high risk
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { medium: 0.3, high: 0.7 }
    }
}

struct Member {
    model: Box<dyn ScoringModel>,
    weight: f64,
}

/// Combines N independently weighted scoring models into one risk score.
///
/// Weights must sum to 1.0 (validated at construction). If a constituent
/// model is unavailable at prediction time its weight is renormalized over
/// the remaining models instead of failing the assessment. Read-only after
/// construction.
pub struct ModelEnsemble {
    members: Vec<Member>,
    thresholds: RiskThresholds,
}

impl ModelEnsemble {
    /// Build an ensemble from models and a weight per model id.
    ///
    /// Fails with [`EngineError::Configuration`] when a model has no weight,
    /// a weight names no model, or the weights do not sum to 1.0.
    pub fn new(
        models: Vec<Box<dyn ScoringModel>>,
        weights: &HashMap<String, f64>,
        thresholds: RiskThresholds,
    ) -> Result<Self, EngineError> {
        if models.is_empty() {
            return Err(EngineError::Configuration(
                "ensemble requires at least one model".to_string(),
            ));
        }
        if weights.len() != models.len() {
            return Err(EngineError::Configuration(format!(
                "{} weights configured for {} models",
                weights.len(),
                models.len()
            )));
        }

        let mut members = Vec::with_capacity(models.len());
        for model in models {
            let weight = *weights.get(model.id()).ok_or_else(|| {
                EngineError::Configuration(format!("no weight for model {}", model.id()))
            })?;
            if !(0.0..=1.0).contains(&weight) {
                return Err(EngineError::Configuration(format!(
                    "weight {} for model {} outside [0, 1]",
                    weight,
                    model.id()
                )));
            }
            members.push(Member { model, weight });
        }

        let sum: f64 = members.iter().map(|m| m.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Configuration(format!(
                "ensemble weights sum to {sum}, expected 1.0"
            )));
        }

        Ok(Self { members, thresholds })
    }

    /// Model ids in registration order.
    pub fn model_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.model.id()).collect()
    }

    /// Score one transaction through every available model.
    ///
    /// Fails only when every constituent model fails.
    pub fn predict_all(
        &self,
        features: &FeatureVector,
        event: &EventContext,
    ) -> Result<RiskAssessment, EngineError> {
        let mut contributions = Vec::with_capacity(self.members.len());
        let mut weighted_sum = 0.0;
        let mut available_weight = 0.0;

        for member in &self.members {
            match member.model.score(features, event) {
                Ok(raw) => {
                    let raw = raw.clamp(0.0, 1.0);
                    weighted_sum += member.weight * raw;
                    available_weight += member.weight;
                    contributions.push(ModelContribution {
                        model_id: member.model.id().to_string(),
                        weight: member.weight,
                        raw_score: raw,
                        skipped: false,
                    });
                }
                Err(e) => {
                    warn!(
                        model = member.model.id(),
                        error = %e,
                        "Model unavailable, renormalizing over remaining models"
                    );
                    contributions.push(ModelContribution {
                        model_id: member.model.id().to_string(),
                        weight: member.weight,
                        raw_score: 0.0,
                        skipped: true,
                    });
                }
            }
        }

        if available_weight <= 0.0 {
            return Err(EngineError::Prediction(
                "all ensemble models failed".to_string(),
            ));
        }

        // Renormalize over the models that actually scored.
        let risk_score = (weighted_sum / available_weight).clamp(0.0, 1.0);
        let risk_level =
            RiskLevel::from_score(risk_score, self.thresholds.medium, self.thresholds.high);

        debug!(
            risk_score = risk_score,
            risk_level = ?risk_level,
            models = contributions.len(),
            "Ensemble prediction complete"
        );

        Ok(RiskAssessment {
            risk_score,
            risk_level,
            contributing_models: contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test model returning a fixed score or a fixed failure.
    struct FixedModel {
        id: String,
        result: Result<f64, ()>,
    }

    impl FixedModel {
        fn ok(id: &str, score: f64) -> Box<dyn ScoringModel> {
            Box::new(Self { id: id.to_string(), result: Ok(score) })
        }

        fn failing(id: &str) -> Box<dyn ScoringModel> {
            Box::new(Self { id: id.to_string(), result: Err(()) })
        }
    }

    impl ScoringModel for FixedModel {
        fn id(&self) -> &str {
            &self.id
        }

        fn score(&self, _: &FeatureVector, _: &EventContext) -> Result<f64, EngineError> {
            self.result
                .map_err(|_| EngineError::Prediction(format!("{} offline", self.id)))
        }
    }

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = ModelEnsemble::new(
            vec![FixedModel::ok("a", 0.5), FixedModel::ok("b", 0.5)],
            &weights(&[("a", 0.5), ("b", 0.4)]),
            RiskThresholds::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.class(), "configuration");
    }

    #[test]
    fn test_missing_weight_rejected() {
        let err = ModelEnsemble::new(
            vec![FixedModel::ok("a", 0.5)],
            &weights(&[("b", 1.0)]),
            RiskThresholds::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.class(), "configuration");
    }

    #[test]
    fn test_weighted_aggregation() {
        let ensemble = ModelEnsemble::new(
            vec![
                FixedModel::ok("a", 0.8),
                FixedModel::ok("b", 0.4),
                FixedModel::ok("c", 0.1),
            ],
            &weights(&[("a", 0.5), ("b", 0.3), ("c", 0.2)]),
            RiskThresholds::default(),
        )
        .unwrap();

        let assessment = ensemble
            .predict_all(&FeatureVector::zeroed(), &EventContext::default())
            .unwrap();

        // 0.5*0.8 + 0.3*0.4 + 0.2*0.1 = 0.54
        assert!((assessment.risk_score - 0.54).abs() < 1e-9);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert_eq!(assessment.contributing_models.len(), 3);
        assert_eq!(assessment.contributing_models[0].model_id, "a");
    }

    #[test]
    fn test_score_always_in_unit_interval() {
        let ensemble = ModelEnsemble::new(
            vec![FixedModel::ok("a", 3.5), FixedModel::ok("b", -1.0)],
            &weights(&[("a", 0.6), ("b", 0.4)]),
            RiskThresholds::default(),
        )
        .unwrap();

        let assessment = ensemble
            .predict_all(&FeatureVector::zeroed(), &EventContext::default())
            .unwrap();
        assert!((0.0..=1.0).contains(&assessment.risk_score));
    }

    #[test]
    fn test_failed_model_renormalized() {
        let ensemble = ModelEnsemble::new(
            vec![
                FixedModel::ok("a", 0.9),
                FixedModel::failing("b"),
                FixedModel::ok("c", 0.5),
            ],
            &weights(&[("a", 0.4), ("b", 0.4), ("c", 0.2)]),
            RiskThresholds::default(),
        )
        .unwrap();

        let assessment = ensemble
            .predict_all(&FeatureVector::zeroed(), &EventContext::default())
            .unwrap();

        // (0.4*0.9 + 0.2*0.5) / 0.6 = 0.7666...
        assert!((assessment.risk_score - 0.46 / 0.6).abs() < 1e-9);

        let skipped: Vec<_> = assessment
            .contributing_models
            .iter()
            .filter(|c| c.skipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].model_id, "b");
    }

    #[test]
    fn test_all_models_failing_is_prediction_error() {
        let ensemble = ModelEnsemble::new(
            vec![FixedModel::failing("a"), FixedModel::failing("b")],
            &weights(&[("a", 0.5), ("b", 0.5)]),
            RiskThresholds::default(),
        )
        .unwrap();

        let err = ensemble
            .predict_all(&FeatureVector::zeroed(), &EventContext::default())
            .unwrap_err();
        assert_eq!(err.class(), "prediction");
    }

    #[test]
    fn test_default_model_set_constructs() {
        let mut w = HashMap::new();
        w.insert("velocity".to_string(), 0.4);
        w.insert("wallet_age".to_string(), 0.35);
        w.insert("activity_burst".to_string(), 0.25);

        let ensemble = ModelEnsemble::new(
            crate::models::scoring::default_models(),
            &w,
            RiskThresholds::default(),
        )
        .unwrap();
        assert_eq!(ensemble.model_ids(), vec!["velocity", "wallet_age", "activity_burst"]);
    }
}
