//! Online Decision Engine
//!
//! Scores incoming ticket-purchase transactions for fraud risk and selects a
//! pricing strategy via an epsilon-greedy bandit, learning from observed
//! outcomes over time. Persistence, outcome feeds and the external pricing
//! model are injected collaborators; the core itself never blocks on I/O
//! beyond those boundaries.

pub mod bandit;
pub mod config;
pub mod error;
pub mod features;
pub mod kpi;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod sources;
pub mod types;

pub use bandit::MultiArmedBandit;
pub use config::AppConfig;
pub use error::EngineError;
pub use features::FeatureEngineer;
pub use kpi::KpiCalculator;
pub use models::ensemble::ModelEnsemble;
pub use orchestrator::DecisionOrchestrator;
pub use types::{DecisionRecord, FeatureVector, PurchaseTransaction, RiskAssessment};
