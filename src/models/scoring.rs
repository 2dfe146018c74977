//! Constituent scoring models.
//!
//! Each model is a fixed, already-fit scoring function over the feature
//! vector: parameters are supplied at construction, never trained here. All
//! models are read-only after construction and score into `[0, 1]`.

use crate::error::EngineError;
use crate::types::features::FeatureVector;
use crate::types::transaction::EventContext;

/// A single already-fit risk scoring function.
pub trait ScoringModel: Send + Sync {
    /// Stable model identifier used for weighting and reporting.
    fn id(&self) -> &str;

    /// Raw fraud probability in `[0, 1]` for one transaction.
    fn score(&self, features: &FeatureVector, event: &EventContext) -> Result<f64, EngineError>;
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic model over transaction velocity signals.
///
/// High short-term velocity relative to the wallet's daily average is the
/// classic bulk-buy / scalping signature.
pub struct VelocityModel {
    pub velocity_weight: f64,
    pub daily_avg_weight: f64,
    pub intercept: f64,
}

impl Default for VelocityModel {
    fn default() -> Self {
        Self {
            velocity_weight: 0.9,
            daily_avg_weight: 0.35,
            intercept: -2.0,
        }
    }
}

impl ScoringModel for VelocityModel {
    fn id(&self) -> &str {
        "velocity"
    }

    fn score(&self, features: &FeatureVector, _event: &EventContext) -> Result<f64, EngineError> {
        let velocity = features.get("txn_velocity_1h").unwrap_or(0.0);
        let daily = features.get("avg_tx_per_day").unwrap_or(0.0);
        let z = self.intercept + self.velocity_weight * velocity + self.daily_avg_weight * daily;
        Ok(sigmoid(z))
    }
}

/// Logistic model penalizing young, thin wallets.
pub struct WalletAgeModel {
    pub intercept: f64,
    pub age_weight: f64,
    pub history_weight: f64,
}

impl Default for WalletAgeModel {
    fn default() -> Self {
        Self {
            intercept: 1.5,
            age_weight: 0.08,
            history_weight: 0.02,
        }
    }
}

impl ScoringModel for WalletAgeModel {
    fn id(&self) -> &str {
        "wallet_age"
    }

    fn score(&self, features: &FeatureVector, _event: &EventContext) -> Result<f64, EngineError> {
        let age_days = features.get("wallet_age_days").unwrap_or(0.0);
        let tx_count = features.get("wallet_tx_count").unwrap_or(0.0);
        let z = self.intercept - self.age_weight * age_days - self.history_weight * tx_count;
        Ok(sigmoid(z))
    }
}

/// Burst-activity anomaly model.
///
/// Scores the combination of tightly spaced purchases and a hot event, where
/// automated buyers concentrate.
pub struct ActivityBurstModel {
    pub intercept: f64,
    pub burst_weight: f64,
    pub popularity_weight: f64,
}

impl Default for ActivityBurstModel {
    fn default() -> Self {
        Self {
            intercept: -2.2,
            burst_weight: 2.4,
            popularity_weight: 1.2,
        }
    }
}

impl ScoringModel for ActivityBurstModel {
    fn id(&self) -> &str {
        "activity_burst"
    }

    fn score(&self, features: &FeatureVector, event: &EventContext) -> Result<f64, EngineError> {
        let delta_hours = features.get("user_activity_delta").unwrap_or(0.0).max(0.0);
        // Tighter spacing -> burst score closer to 1
        let burst = 1.0 / (1.0 + delta_hours);
        let popularity = event
            .popularity_score
            .or_else(|| features.get("event_popularity_score"))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let z = self.intercept + self.burst_weight * burst + self.popularity_weight * popularity;
        Ok(sigmoid(z))
    }
}

/// Default model set matching the default ensemble weights.
pub fn default_models() -> Vec<Box<dyn ScoringModel>> {
    vec![
        Box::new(VelocityModel::default()),
        Box::new(WalletAgeModel::default()),
        Box::new(ActivityBurstModel::default()),
    ]
}
