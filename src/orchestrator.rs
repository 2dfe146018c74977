//! Decision orchestrator: the sole entry and exit point of the core.
//!
//! Sequences feature derivation, risk scoring and bandit routing for each
//! transaction, persists the merged record, and applies observed rewards at
//! most once per request. Holds references to all other components; performs
//! no business logic beyond composition and error translation.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bandit::MultiArmedBandit;
use crate::error::EngineError;
use crate::features::FeatureEngineer;
use crate::kpi::KpiCalculator;
use crate::metrics::EngineMetrics;
use crate::models::ensemble::ModelEnsemble;
use crate::sources::{DecisionLog, RewardObserver};
use crate::types::decision::{
    DecisionRecord, DegradedReason, KpiSnapshot, RiskAssessment, RiskLevel,
};
use crate::types::features::FeatureVector;
use crate::types::transaction::PurchaseTransaction;

/// Default timeout applied to every external collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 2_000;

/// Composes the core components per incoming transaction.
///
/// Constructed once at process start and shared by reference with request
/// handlers; every collaborator is injected.
pub struct DecisionOrchestrator {
    features: Arc<FeatureEngineer>,
    ensemble: Arc<ModelEnsemble>,
    bandit: Arc<MultiArmedBandit>,
    kpis: Arc<KpiCalculator>,
    log: Arc<dyn DecisionLog>,
    metrics: Arc<EngineMetrics>,
    collaborator_timeout: Duration,
}

impl DecisionOrchestrator {
    pub fn new(
        features: Arc<FeatureEngineer>,
        ensemble: Arc<ModelEnsemble>,
        bandit: Arc<MultiArmedBandit>,
        kpis: Arc<KpiCalculator>,
        log: Arc<dyn DecisionLog>,
        metrics: Arc<EngineMetrics>,
        collaborator_timeout: Duration,
    ) -> Self {
        Self {
            features,
            ensemble,
            bandit,
            kpis,
            log,
            metrics,
            collaborator_timeout,
        }
    }

    /// Score, price and record one transaction.
    ///
    /// Never fails outright for collaborator trouble: feature lookups, the
    /// ensemble and the log append each degrade independently, and the record
    /// carries what went wrong so downstream KPI consumers can tell degraded
    /// decisions from clean ones.
    pub async fn process_transaction(
        &self,
        tx: &PurchaseTransaction,
    ) -> Result<DecisionRecord, EngineError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let mut degradations: Vec<DegradedReason> = Vec::new();

        // Feature derivation, bounded by the collaborator timeout.
        let computed = match tokio::time::timeout(
            self.collaborator_timeout,
            self.features.compute_features(
                &tx.transaction_id,
                &tx.wallet_address,
                &tx.event_id,
                tx.created_at,
            ),
        )
        .await
        {
            Ok(computed) => {
                if !computed.source_available {
                    degradations.push(DegradedReason::FeatureSource);
                }
                computed
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    timeout_ms = self.collaborator_timeout.as_millis() as u64,
                    "Feature lookup timed out, imputing defaults"
                );
                degradations.push(DegradedReason::FeatureSource);
                crate::features::ComputedFeatures {
                    vector: FeatureVector::zeroed(),
                    source_available: false,
                    event: Default::default(),
                }
            }
        };

        // Risk scoring is pure and in-process; a total ensemble failure
        // degrades to a neutral verdict rather than failing the request.
        let risk = match self.ensemble.predict_all(&computed.vector, &computed.event) {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    error = %e,
                    "Ensemble failed, substituting neutral risk"
                );
                degradations.push(DegradedReason::RiskModels);
                RiskAssessment {
                    risk_score: 0.5,
                    risk_level: RiskLevel::Medium,
                    contributing_models: Vec::new(),
                }
            }
        };

        // Pricing runs independently of risk scoring.
        let (bandit_decision, pricing_degraded) = self
            .bandit
            .route_request(&request_id, &tx.event_id, tx.price_paid, &computed.event)
            .await;
        if pricing_degraded {
            degradations.push(DegradedReason::PricingModel);
        }

        let mut record = DecisionRecord {
            request_id: request_id.clone(),
            transaction_id: tx.transaction_id.clone(),
            wallet_address: tx.wallet_address.clone(),
            event_id: tx.event_id.clone(),
            price_paid: tx.price_paid,
            features: computed.vector,
            risk,
            bandit: bandit_decision,
            degraded: !degradations.is_empty(),
            degradations,
            reward: None,
            finalized_at: None,
            created_at: Utc::now(),
        };

        // The log append is non-critical: a slow or absent log degrades the
        // record instead of failing the decision.
        match tokio::time::timeout(self.collaborator_timeout, self.log.append(record.clone())).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(request_id = %request_id, error = %e, "Decision log append failed");
                record.degradations.push(DegradedReason::DecisionLog);
                record.degraded = true;
            }
            Err(_) => {
                warn!(request_id = %request_id, "Decision log append timed out");
                record.degradations.push(DegradedReason::DecisionLog);
                record.degraded = true;
            }
        }

        self.metrics.record_decision(
            started.elapsed(),
            record.risk.risk_score,
            &record.bandit.selected_arm,
            record.degraded,
        );
        debug!(
            request_id = %request_id,
            transaction_id = %tx.transaction_id,
            risk_score = record.risk.risk_score,
            arm = %record.bandit.selected_arm,
            final_price = record.bandit.pricing.final_price,
            degraded = record.degraded,
            "Transaction processed"
        );

        Ok(record)
    }

    /// Apply an observed outcome to the bandit, at most once per request id.
    ///
    /// The decision log's check-and-mark gates the update: a duplicate
    /// observation is a no-op, and an unknown request id is surfaced without
    /// mutating any arm. Returns whether the reward was newly applied.
    pub async fn apply_reward(&self, request_id: &str, reward: f64) -> Result<bool, EngineError> {
        let marked = tokio::time::timeout(
            self.collaborator_timeout,
            self.log.mark_reward(request_id, reward, Utc::now()),
        )
        .await
        .map_err(|_| {
            EngineError::ServiceUnavailable("decision log mark timed out".to_string())
        })??;

        match marked {
            Some(record) => {
                self.bandit
                    .update_reward(&record.bandit.selected_arm, reward)?;
                self.metrics.record_reward(false);
                debug!(
                    request_id = %request_id,
                    arm = %record.bandit.selected_arm,
                    reward = reward,
                    "Reward applied"
                );
                Ok(true)
            }
            None => {
                self.metrics.record_reward(true);
                debug!(request_id = %request_id, "Duplicate reward observation dropped");
                Ok(false)
            }
        }
    }

    /// Drain an outcome feed, applying each observation. Returns when the
    /// feed ends.
    pub async fn observe_rewards(&self, observer: &dyn RewardObserver) {
        while let Some(outcome) = observer.next_outcome().await {
            if let Err(e) = self.apply_reward(&outcome.request_id, outcome.reward).await {
                warn!(
                    request_id = %outcome.request_id,
                    error = %e,
                    "Failed to apply observed reward"
                );
            }
        }
        info!("Reward observer feed ended");
    }

    /// All business KPIs over the given (or default) trailing window.
    pub async fn get_all_metrics(
        &self,
        window_hours: Option<u32>,
    ) -> Result<std::collections::HashMap<String, KpiSnapshot>, EngineError> {
        tokio::time::timeout(self.collaborator_timeout, self.kpis.get_all_kpis(window_hours))
            .await
            .map_err(|_| EngineError::ServiceUnavailable("KPI query timed out".to_string()))?
    }

    /// Current arm statistics, for reporting.
    pub fn arm_stats(&self) -> Vec<crate::bandit::ArmStats> {
        self.bandit.arm_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandit::MultiArmedBandit;
    use crate::kpi::DEFAULT_WINDOW_HOURS;
    use crate::models::ensemble::RiskThresholds;
    use crate::models::scoring::default_models;
    use crate::sources::{
        FeatureDataSource, MemoryDecisionLog, StaticFeatureSource, WalletEventAttributes,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::collections::HashMap;

    fn default_weights() -> HashMap<String, f64> {
        let mut w = HashMap::new();
        w.insert("velocity".to_string(), 0.4);
        w.insert("wallet_age".to_string(), 0.35);
        w.insert("activity_burst".to_string(), 0.25);
        w
    }

    fn orchestrator_with(
        source: Arc<dyn FeatureDataSource>,
        log: Arc<dyn DecisionLog>,
    ) -> DecisionOrchestrator {
        let ensemble = Arc::new(
            ModelEnsemble::new(default_models(), &default_weights(), RiskThresholds::default())
                .unwrap(),
        );
        let bandit = Arc::new(
            MultiArmedBandit::with_seed(MultiArmedBandit::default_arms(false), 0.0, None, 7)
                .unwrap(),
        );
        let kpis = Arc::new(KpiCalculator::new(log.clone(), DEFAULT_WINDOW_HOURS, 10_000));
        DecisionOrchestrator::new(
            Arc::new(FeatureEngineer::new(source)),
            ensemble,
            bandit,
            kpis,
            log,
            Arc::new(EngineMetrics::new()),
            Duration::from_millis(DEFAULT_COLLABORATOR_TIMEOUT_MS),
        )
    }

    fn known_wallet_source() -> Arc<StaticFeatureSource> {
        let mut source = StaticFeatureSource::new();
        source.insert(
            "0xw1",
            WalletEventAttributes {
                wallet_created_at: Some(Utc::now() - ChronoDuration::days(200)),
                wallet_tx_count: Some(40),
                wallet_tx_last_hour: Some(1),
                wallet_active_days: Some(20),
                wallet_avg_ticket_price: Some(90.0),
                wallet_last_tx_at: Some(Utc::now() - ChronoDuration::days(3)),
                event_created_at: Some(Utc::now() - ChronoDuration::days(14)),
                event_starts_at: Some(Utc::now() + ChronoDuration::days(10)),
                event_popularity_score: Some(0.4),
                event_avg_price: Some(100.0),
            },
        );
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_clean_decision_end_to_end() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(known_wallet_source(), log.clone());

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();

        assert!(!record.degraded);
        assert!(record.degradations.is_empty());
        assert!((0.0..=1.0).contains(&record.risk.risk_score));
        assert_eq!(record.risk.contributing_models.len(), 3);
        assert!(!record.bandit.decision_path.is_empty());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_wallet_degrades_but_decides() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(Arc::new(StaticFeatureSource::new()), log.clone());

        let tx = PurchaseTransaction::new("tx_1", "0xghost", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();

        assert!(record.degraded);
        assert!(record.degradations.contains(&DegradedReason::FeatureSource));
        // The decision still carries a full risk assessment and price
        assert!((0.0..=1.0).contains(&record.risk.risk_score));
        assert!(record.bandit.pricing.final_price > 0.0);
        assert_eq!(log.len(), 1);
    }

    /// Log that rejects every append but still marks rewards.
    struct DeadLog;

    #[async_trait]
    impl DecisionLog for DeadLog {
        async fn append(&self, _record: DecisionRecord) -> Result<(), EngineError> {
            Err(EngineError::ServiceUnavailable("log offline".to_string()))
        }

        async fn query_window(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<DecisionRecord>, EngineError> {
            Ok(Vec::new())
        }

        async fn mark_reward(
            &self,
            request_id: &str,
            _reward: f64,
            _finalized_at: DateTime<Utc>,
        ) -> Result<Option<DecisionRecord>, EngineError> {
            Err(EngineError::DataUnavailable(format!(
                "no decision record for {request_id}"
            )))
        }
    }

    #[tokio::test]
    async fn test_dead_log_degrades_instead_of_failing() {
        let orch = orchestrator_with(known_wallet_source(), Arc::new(DeadLog));

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();

        assert!(record.degraded);
        assert!(record.degradations.contains(&DegradedReason::DecisionLog));
    }

    /// Pricing model that never answers.
    struct HangingPricingModel;

    #[async_trait]
    impl crate::sources::PricingModel for HangingPricingModel {
        async fn score(
            &self,
            base: f64,
            _ctx: &crate::types::transaction::EventContext,
        ) -> Result<f64, EngineError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(base)
        }
    }

    #[tokio::test]
    async fn test_hung_pricing_model_yields_degraded_decision() {
        let log: Arc<dyn DecisionLog> = Arc::new(MemoryDecisionLog::new());
        let ensemble = Arc::new(
            ModelEnsemble::new(default_models(), &default_weights(), RiskThresholds::default())
                .unwrap(),
        );
        // Only a model arm, so every request must go through the hung model
        let bandit = Arc::new(
            MultiArmedBandit::with_seed(
                vec![(
                    "ml_pricing".to_string(),
                    crate::bandit::PricingStrategy::Model,
                )],
                0.0,
                Some(Arc::new(HangingPricingModel)),
                7,
            )
            .unwrap()
            .with_pricing_timeout(Duration::from_millis(50)),
        );
        let kpis = Arc::new(KpiCalculator::new(log.clone(), DEFAULT_WINDOW_HOURS, 10_000));
        let orch = DecisionOrchestrator::new(
            Arc::new(FeatureEngineer::new(known_wallet_source())),
            ensemble,
            bandit,
            kpis,
            log,
            Arc::new(EngineMetrics::new()),
            Duration::from_millis(100),
        );

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = tokio::time::timeout(
            Duration::from_secs(1),
            orch.process_transaction(&tx),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(record.degraded);
        assert!(record.degradations.contains(&DegradedReason::PricingModel));
        assert_eq!(record.bandit.pricing.final_price, 100.0);
    }

    #[tokio::test]
    async fn test_reward_is_applied_at_most_once() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(known_wallet_source(), log.clone());

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();
        let arm = record.bandit.selected_arm.clone();

        assert!(orch.apply_reward(&record.request_id, 0.9).await.unwrap());
        // Same observation delivered again: dropped, not double counted
        assert!(!orch.apply_reward(&record.request_id, 0.9).await.unwrap());

        let stats = orch.arm_stats();
        let armed = stats.iter().find(|a| a.name == arm).unwrap();
        assert_eq!(armed.count, 1);
        assert!((armed.avg_reward - 0.9).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_reward_for_unknown_request_mutates_nothing() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(known_wallet_source(), log);

        let err = orch.apply_reward("ghost", 1.0).await.unwrap_err();
        assert_eq!(err.class(), "data_unavailable");
        assert!(orch.arm_stats().iter().all(|a| a.count == 0));
    }

    #[tokio::test]
    async fn test_get_all_metrics_reflects_processed_rewards() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(known_wallet_source(), log);

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();
        orch.apply_reward(&record.request_id, 1.0).await.unwrap();

        let kpis = orch.get_all_metrics(Some(24)).await.unwrap();
        assert_eq!(kpis.len(), 4);
        assert!((kpis["conversion_rate"].value - 1.0).abs() < 1e-9);
        assert!(kpis["revenue_per_hour"].value > 0.0);
    }

    #[tokio::test]
    async fn test_observe_rewards_drains_feed() {
        let log = Arc::new(MemoryDecisionLog::new());
        let orch = orchestrator_with(known_wallet_source(), log);

        let tx = PurchaseTransaction::new("tx_1", "0xw1", "evt_1", 100.0);
        let record = orch.process_transaction(&tx).await.unwrap();

        let (sender, observer) = crate::sources::ChannelRewardObserver::new(4);
        sender
            .send(crate::sources::ObservedOutcome {
                request_id: record.request_id.clone(),
                reward: 0.7,
            })
            .await
            .unwrap();
        drop(sender);

        orch.observe_rewards(&observer).await;

        let arm = record.bandit.selected_arm;
        let stats = orch.arm_stats();
        assert_eq!(stats.iter().find(|a| a.name == arm).unwrap().count, 1);
    }
}
