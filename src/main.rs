//! Decision Engine - Demo Entry Point
//!
//! Wires the core components with in-memory collaborators and drives a
//! synthetic transaction stream through the orchestrator with bounded
//! concurrency, feeding observed rewards back into the bandit.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use decision_engine::{
    bandit::MultiArmedBandit,
    config::AppConfig,
    features::FeatureEngineer,
    kpi::KpiCalculator,
    metrics::{EngineMetrics, MetricsReporter},
    models::{ensemble::ModelEnsemble, scoring::default_models},
    orchestrator::DecisionOrchestrator,
    sources::{
        ChannelRewardObserver, MemoryDecisionLog, ObservedOutcome, StaticFeatureSource,
        WalletEventAttributes,
    },
    PurchaseTransaction,
};
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::info;

const SYNTHETIC_TRANSACTIONS: usize = 500;
const MAX_CONCURRENT: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_loaded) = if Path::new("config/config.toml").exists() {
        (AppConfig::load()?, true)
    } else {
        (AppConfig::default(), false)
    };

    init_tracing(&config)?;

    info!("Starting decision engine");
    if !config_loaded {
        info!("No config file found, using defaults");
    }

    // Collaborators: in-memory for the demo; production injects real ones.
    let source = Arc::new(demo_feature_source());
    let log = Arc::new(MemoryDecisionLog::new());
    let metrics = Arc::new(EngineMetrics::new());

    let ensemble = Arc::new(ModelEnsemble::new(
        default_models(),
        &config.ensemble.weights,
        config.ensemble.risk_levels,
    )?);
    let bandit = Arc::new(
        MultiArmedBandit::new(
            config
                .bandit
                .arms
                .iter()
                .map(|a| (a.name.clone(), a.strategy))
                .collect(),
            config.bandit.epsilon,
            None,
        )?
        .with_pricing_timeout(Duration::from_millis(
            config.orchestrator.collaborator_timeout_ms,
        )),
    );
    let kpis = Arc::new(KpiCalculator::new(
        log.clone(),
        config.kpi.default_window_hours,
        config.kpi.max_scan_records,
    ));
    let orchestrator = Arc::new(DecisionOrchestrator::new(
        Arc::new(FeatureEngineer::new(source)),
        ensemble,
        bandit,
        kpis,
        log.clone(),
        metrics.clone(),
        Duration::from_millis(config.orchestrator.collaborator_timeout_ms),
    ));

    info!(
        epsilon = config.bandit.epsilon,
        arms = config.bandit.arms.len(),
        "Engine components initialized"
    );

    tokio::spawn({
        let reporter = MetricsReporter::new(metrics.clone(), 10);
        async move { reporter.start().await }
    });

    // Outcome feed: rewards flow back asynchronously, keyed by request id.
    let (outcome_tx, observer) = ChannelRewardObserver::new(256);
    let reward_task = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.observe_rewards(&observer).await }
    });

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT));
    let mut rng = rand::rngs::StdRng::seed_from_u64(17);
    let mut workers = Vec::with_capacity(SYNTHETIC_TRANSACTIONS);

    for i in 0..SYNTHETIC_TRANSACTIONS {
        let wallet = format!("0xwallet_{}", rng.gen_range(0..6));
        let event = format!("evt_{}", rng.gen_range(0..3));
        let price = rng.gen_range(40.0..160.0);
        let converts = rng.gen_bool(0.6);
        let tx = PurchaseTransaction::new(format!("tx_{i}"), wallet, event, price);

        let permit = semaphore.clone().acquire_owned().await?;
        let orchestrator = orchestrator.clone();
        let outcome_tx = outcome_tx.clone();
        workers.push(tokio::spawn(async move {
            if let Ok(record) = orchestrator.process_transaction(&tx).await {
                let reward = if converts { 1.0 } else { 0.0 };
                let _ = outcome_tx
                    .send(ObservedOutcome {
                        request_id: record.request_id,
                        reward,
                    })
                    .await;
            }
            drop(permit);
        }));
    }

    for worker in workers {
        worker.await?;
    }
    drop(outcome_tx);
    reward_task.await?;

    metrics.log_summary();
    for arm in orchestrator.arm_stats() {
        info!(
            arm = %arm.name,
            count = arm.count,
            avg_reward = format!("{:.3}", arm.avg_reward),
            "Final arm state"
        );
    }
    for (name, kpi) in orchestrator.get_all_metrics(None).await? {
        info!(kpi = %name, value = format!("{:.4}", kpi.value), window_hours = kpi.window_hours, "KPI");
    }

    info!(records = log.len(), "Decision engine shutting down");
    Ok(())
}

/// Subscriber init driven by the logging section: level feeds the env
/// filter's crate directive, format picks json or pretty output.
fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("decision_engine={}", config.logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Attribute table for a handful of demo wallets with varied risk profiles.
fn demo_feature_source() -> StaticFeatureSource {
    let mut source = StaticFeatureSource::new();
    let now = Utc::now();

    for i in 0..5i64 {
        // Wallet 0 looks like a fresh bulk buyer, the rest are seasoned.
        let age_days = if i == 0 { 1 } else { 90 + i * 60 };
        source.insert(
            format!("0xwallet_{i}"),
            WalletEventAttributes {
                wallet_created_at: Some(now - ChronoDuration::days(age_days)),
                wallet_tx_count: Some(if i == 0 { 25 } else { 10 + i as u64 }),
                wallet_tx_last_hour: Some(if i == 0 { 9 } else { 1 }),
                wallet_active_days: Some(if i == 0 { 1 } else { 30 }),
                wallet_avg_ticket_price: Some(80.0 + 10.0 * i as f64),
                wallet_last_tx_at: Some(now - ChronoDuration::hours(if i == 0 { 1 } else { 72 })),
                event_created_at: Some(now - ChronoDuration::days(21)),
                event_starts_at: Some(now + ChronoDuration::days(14)),
                event_popularity_score: Some(0.3 + 0.1 * i as f64),
                event_avg_price: Some(105.0),
            },
        );
    }
    // 0xwallet_5 is intentionally absent to exercise the imputation path.
    source
}
