//! Decision record structures: risk assessments, bandit decisions and the
//! merged append-only record handed to the decision log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::features::FeatureVector;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify a risk score. Boundaries are inclusive on the lower edge:
    /// `score < 0.3` is low, `0.3 <= score < 0.7` medium, `score >= 0.7` high.
    pub fn from_score(score: f64, medium: f64, high: f64) -> Self {
        if score >= high {
            RiskLevel::High
        } else if score >= medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One model's contribution to an ensemble verdict, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelContribution {
    /// Model identifier
    pub model_id: String,
    /// Configured weight for this model
    pub weight: f64,
    /// Raw score the model produced (0.0 when skipped)
    pub raw_score: f64,
    /// True when the model was unavailable and its weight was renormalized
    /// over the remaining models
    pub skipped: bool,
}

/// Fraud/risk verdict for one transaction. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Aggregated risk score in `[0, 1]`
    pub risk_score: f64,
    /// Classification of the score
    pub risk_level: RiskLevel,
    /// Per-model breakdown, ordered by model registration
    pub contributing_models: Vec<ModelContribution>,
}

/// One step of a bandit decision trace.
///
/// The trace is a first-class output consumed by downstream tooling, not
/// incidental logging. Prefer adding new variants over changing existing
/// semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DecisionStep {
    /// Arm stats considered before selection, one per registered arm.
    ArmConsidered {
        arm: String,
        count: u64,
        avg_reward: f64,
    },
    /// Selection came from the exploration branch (uniform random).
    Explored { epsilon: f64 },
    /// Selection came from the exploitation branch (highest average reward,
    /// first-registered arm wins ties).
    Exploited { best_avg_reward: f64 },
    /// Price computed by the selected arm's strategy.
    Priced { base_price: f64, final_price: f64 },
    /// The arm's pricing collaborator failed; base price was used instead.
    PricingFallback { reason: String },
}

/// Pricing result attached to a bandit decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOutput {
    pub base_price: f64,
    pub final_price: f64,
}

/// Outcome of routing one request through the bandit. The reward is attached
/// later through a separate call keyed by `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditDecision {
    pub request_id: String,
    pub event_id: String,
    pub selected_arm: String,
    pub pricing: PricingOutput,
    /// Ordered explanation of how the selection and price were produced
    pub decision_path: Vec<DecisionStep>,
    pub timestamp: DateTime<Utc>,
}

/// Why a decision was flagged as degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Feature lookup failed or timed out; defaults were imputed
    FeatureSource,
    /// The ensemble failed; a neutral risk score was substituted
    RiskModels,
    /// The decision log append failed or timed out
    DecisionLog,
    /// The external pricing model failed; base price was used
    PricingModel,
}

/// Merge of risk assessment, bandit decision and transaction identifiers.
///
/// Appended to the decision log and never mutated by the core afterwards;
/// the log itself attaches the observed reward via its check-and-mark call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Engine-assigned identifier; rewards are keyed by this
    pub request_id: String,
    pub transaction_id: String,
    pub wallet_address: String,
    pub event_id: String,
    pub price_paid: f64,
    pub features: FeatureVector,
    pub risk: RiskAssessment,
    pub bandit: BanditDecision,
    /// True when any collaborator was unavailable while deciding
    pub degraded: bool,
    /// Error classes that degraded this decision, empty when clean
    pub degradations: Vec<DegradedReason>,
    /// Observed outcome, attached at most once by the decision log
    pub reward: Option<f64>,
    /// When the outcome was observed
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Whether the observed outcome counts as a conversion.
    pub fn converted(&self) -> bool {
        self.reward.map(|r| r > 0.0).unwrap_or(false)
    }
}

/// One rolling-window business metric, recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub kpi_name: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
    pub window_hours: u32,
}
