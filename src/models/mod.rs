//! Risk scoring models and the weighted ensemble combining them

pub mod ensemble;
pub mod scoring;

pub use ensemble::ModelEnsemble;
pub use scoring::{ActivityBurstModel, ScoringModel, VelocityModel, WalletAgeModel};
