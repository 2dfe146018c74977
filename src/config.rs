//! Configuration management for the decision engine

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::bandit::{PricingStrategy, DEFAULT_EPSILON};
use crate::kpi::DEFAULT_WINDOW_HOURS;
use crate::models::ensemble::RiskThresholds;
use crate::orchestrator::DEFAULT_COLLABORATOR_TIMEOUT_MS;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bandit: BanditConfig,
    pub ensemble: EnsembleConfig,
    pub kpi: KpiConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One registered pricing arm
#[derive(Debug, Clone, Deserialize)]
pub struct ArmConfig {
    pub name: String,
    pub strategy: PricingStrategy,
}

/// Bandit configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BanditConfig {
    /// Exploration probability in [0, 1]
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Registered arms, in tie-break priority order
    #[serde(default = "default_arm_configs")]
    pub arms: Vec<ArmConfig>,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_arm_configs() -> Vec<ArmConfig> {
    vec![
        ArmConfig { name: "baseline".to_string(), strategy: PricingStrategy::Baseline },
        ArmConfig { name: "surge_pricing".to_string(), strategy: PricingStrategy::Surge },
        ArmConfig { name: "early_bird".to_string(), strategy: PricingStrategy::EarlyBird },
    ]
}

/// Ensemble configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Weight per model id; must sum to 1.0
    pub weights: HashMap<String, f64>,
    /// Risk level classification thresholds
    #[serde(default)]
    pub risk_levels: RiskThresholds,
}

/// KPI configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KpiConfig {
    /// Trailing window when the caller does not specify one
    #[serde(default = "default_window")]
    pub default_window_hours: u32,
    /// Bound on records scanned per KPI query, newest kept
    #[serde(default = "default_max_scan")]
    pub max_scan_records: usize,
}

fn default_window() -> u32 {
    DEFAULT_WINDOW_HOURS
}

fn default_max_scan() -> usize {
    100_000
}

/// Orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout applied to every external collaborator call
    #[serde(default = "default_timeout_ms")]
    pub collaborator_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_COLLABORATOR_TIMEOUT_MS
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file location
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("velocity".to_string(), 0.4);
        weights.insert("wallet_age".to_string(), 0.35);
        weights.insert("activity_burst".to_string(), 0.25);

        Self {
            bandit: BanditConfig {
                epsilon: DEFAULT_EPSILON,
                arms: default_arm_configs(),
            },
            ensemble: EnsembleConfig {
                weights,
                risk_levels: RiskThresholds::default(),
            },
            kpi: KpiConfig {
                default_window_hours: DEFAULT_WINDOW_HOURS,
                max_scan_records: default_max_scan(),
            },
            orchestrator: OrchestratorConfig {
                collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            },
            logging: LoggingConfig::default(),
        }
    }
}
