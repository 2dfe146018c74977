//! Type definitions for the decision engine

pub mod decision;
pub mod features;
pub mod transaction;

pub use decision::{
    BanditDecision, DecisionRecord, DecisionStep, DegradedReason, KpiSnapshot, ModelContribution,
    PricingOutput, RiskAssessment, RiskLevel,
};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use transaction::{EventContext, PurchaseTransaction};
