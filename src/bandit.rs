//! Epsilon-greedy multi-armed bandit over named pricing strategies.
//!
//! Owns the only mutable shared state in the core: per-arm counters and
//! running reward averages. Selection and reward updates are safe to call
//! concurrently through `&self`; each update is a single mutex-guarded
//! read-modify-write, so counts are never lost or duplicated.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::sources::PricingModel;
use crate::types::decision::{BanditDecision, DecisionStep, PricingOutput};
use crate::types::transaction::EventContext;

/// Default exploration probability.
pub const DEFAULT_EPSILON: f64 = 0.15;

/// Default bound on the external pricing model call.
pub const DEFAULT_PRICING_TIMEOUT_MS: u64 = 2_000;

/// Floor for any computed price, as a fraction of the base price.
const MIN_PRICE_FRACTION: f64 = 0.01;

/// Surge multiplier span: popularity 1.0 scales the price by 1.5x.
const SURGE_SPAN: f64 = 0.5;

/// Early-bird discount per day of lead time, capped at 25%.
const EARLY_BIRD_PER_DAY: f64 = 0.005;
const EARLY_BIRD_CAP: f64 = 0.25;

/// Pricing behavior attached to an arm at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingStrategy {
    /// Base price unchanged
    Baseline,
    /// Scales up with event popularity, never below base
    Surge,
    /// Discounts by days of lead time before the event
    EarlyBird,
    /// Delegates to the injected external pricing model
    Model,
}

/// Public snapshot of one arm's learning state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmStats {
    pub name: String,
    pub strategy: PricingStrategy,
    pub count: u64,
    pub avg_reward: f64,
    pub cumulative_reward: f64,
}

struct ArmState {
    name: String,
    strategy: PricingStrategy,
    count: u64,
    avg_reward: f64,
    cumulative_reward: f64,
}

struct BanditState {
    arms: Vec<ArmState>,
    rng: StdRng,
}

/// Epsilon-greedy arm selector and online reward aggregator.
pub struct MultiArmedBandit {
    epsilon: f64,
    state: Mutex<BanditState>,
    pricing_model: Option<Arc<dyn PricingModel>>,
    /// Bound on the external pricing model call; the model is the only
    /// collaborator the bandit awaits, so this keeps `route_request` bounded.
    pricing_timeout: Duration,
}

impl MultiArmedBandit {
    /// Register arms in order. First-registered wins exploitation ties, so
    /// registration order is part of the contract.
    pub fn new(
        arms: Vec<(String, PricingStrategy)>,
        epsilon: f64,
        pricing_model: Option<Arc<dyn PricingModel>>,
    ) -> Result<Self, EngineError> {
        Self::with_rng(arms, epsilon, pricing_model, StdRng::from_entropy())
    }

    /// Seeded constructor for deterministic tests and replays.
    pub fn with_seed(
        arms: Vec<(String, PricingStrategy)>,
        epsilon: f64,
        pricing_model: Option<Arc<dyn PricingModel>>,
        seed: u64,
    ) -> Result<Self, EngineError> {
        Self::with_rng(arms, epsilon, pricing_model, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        arms: Vec<(String, PricingStrategy)>,
        epsilon: f64,
        pricing_model: Option<Arc<dyn PricingModel>>,
        rng: StdRng,
    ) -> Result<Self, EngineError> {
        if arms.is_empty() {
            return Err(EngineError::Configuration(
                "bandit requires at least one arm".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(EngineError::Configuration(format!(
                "epsilon {epsilon} outside [0, 1]"
            )));
        }

        let mut states: Vec<ArmState> = Vec::with_capacity(arms.len());
        for (name, strategy) in arms {
            if states.iter().any(|a| a.name == name) {
                return Err(EngineError::Configuration(format!(
                    "duplicate arm {name}"
                )));
            }
            if strategy == PricingStrategy::Model && pricing_model.is_none() {
                return Err(EngineError::Configuration(format!(
                    "arm {name} requires a pricing model"
                )));
            }
            states.push(ArmState {
                name,
                strategy,
                count: 0,
                avg_reward: 0.0,
                cumulative_reward: 0.0,
            });
        }

        Ok(Self {
            epsilon,
            state: Mutex::new(BanditState { arms: states, rng }),
            pricing_model,
            pricing_timeout: Duration::from_millis(DEFAULT_PRICING_TIMEOUT_MS),
        })
    }

    /// Override the bound on the external pricing model call.
    pub fn with_pricing_timeout(mut self, timeout: Duration) -> Self {
        self.pricing_timeout = timeout;
        self
    }

    /// The canonical four-arm configuration.
    pub fn with_default_arms(
        epsilon: f64,
        pricing_model: Option<Arc<dyn PricingModel>>,
    ) -> Result<Self, EngineError> {
        Self::new(Self::default_arms(pricing_model.is_some()), epsilon, pricing_model)
    }

    /// Canonical arm set; `ml_pricing` is included only when a model exists.
    pub fn default_arms(with_model: bool) -> Vec<(String, PricingStrategy)> {
        let mut arms = vec![
            ("baseline".to_string(), PricingStrategy::Baseline),
            ("surge_pricing".to_string(), PricingStrategy::Surge),
            ("early_bird".to_string(), PricingStrategy::EarlyBird),
        ];
        if with_model {
            arms.push(("ml_pricing".to_string(), PricingStrategy::Model));
        }
        arms
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Select an arm: explore uniformly with probability epsilon, otherwise
    /// exploit the highest average reward (first-registered wins ties; from
    /// a cold start that is the first-registered arm).
    pub fn select_arm(&self) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (idx, _) = Self::select_locked(&mut state, self.epsilon);
        state.arms[idx].name.clone()
    }

    /// Selection with the trace steps the decision path needs.
    fn select_locked(state: &mut BanditState, epsilon: f64) -> (usize, Vec<DecisionStep>) {
        let mut path: Vec<DecisionStep> = state
            .arms
            .iter()
            .map(|a| DecisionStep::ArmConsidered {
                arm: a.name.clone(),
                count: a.count,
                avg_reward: a.avg_reward,
            })
            .collect();

        let explore = epsilon > 0.0 && state.rng.gen::<f64>() < epsilon;
        let idx = if explore {
            path.push(DecisionStep::Explored { epsilon });
            state.rng.gen_range(0..state.arms.len())
        } else {
            // Strict comparison keeps the first-registered arm on ties.
            let mut best = 0;
            for (i, arm) in state.arms.iter().enumerate() {
                if arm.avg_reward > state.arms[best].avg_reward {
                    best = i;
                }
            }
            path.push(DecisionStep::Exploited {
                best_avg_reward: state.arms[best].avg_reward,
            });
            best
        };
        (idx, path)
    }

    /// Apply an observed reward to an arm's running average.
    ///
    /// Overflow-safe running mean; no reward history is retained. Fails with
    /// [`EngineError::UnknownArm`] without touching any state when the arm
    /// was never registered.
    pub fn update_reward(&self, arm_name: &str, reward: f64) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let arm = state
            .arms
            .iter_mut()
            .find(|a| a.name == arm_name)
            .ok_or_else(|| EngineError::UnknownArm(arm_name.to_string()))?;

        arm.count += 1;
        arm.cumulative_reward += reward;
        arm.avg_reward += (reward - arm.avg_reward) / arm.count as f64;

        debug!(
            arm = %arm.name,
            count = arm.count,
            avg_reward = arm.avg_reward,
            "Reward applied"
        );
        Ok(())
    }

    /// Price the base price through the named arm's strategy.
    ///
    /// Never returns a negative price; the result is floored at
    /// `0.01 * base_price`. Does not touch arm counters on any path.
    pub async fn calculate_pricing(
        &self,
        base_price: f64,
        arm_name: &str,
        context: &EventContext,
    ) -> Result<f64, EngineError> {
        let strategy = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state
                .arms
                .iter()
                .find(|a| a.name == arm_name)
                .map(|a| a.strategy)
                .ok_or_else(|| EngineError::UnknownArm(arm_name.to_string()))?
        };

        let price = match strategy {
            PricingStrategy::Baseline => base_price,
            PricingStrategy::Surge => {
                let popularity = context.popularity_score.unwrap_or(0.0).clamp(0.0, 1.0);
                // Multiplier floored at 1.0: surge never undercuts base.
                base_price * (1.0 + SURGE_SPAN * popularity)
            }
            PricingStrategy::EarlyBird => {
                let days = context.days_until_event.unwrap_or(0.0).max(0.0);
                let discount = (EARLY_BIRD_PER_DAY * days).min(EARLY_BIRD_CAP);
                base_price * (1.0 - discount)
            }
            PricingStrategy::Model => {
                let model = self.pricing_model.as_ref().ok_or_else(|| {
                    EngineError::ServiceUnavailable("no pricing model injected".to_string())
                })?;
                match tokio::time::timeout(self.pricing_timeout, model.score(base_price, context))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(EngineError::ServiceUnavailable(
                            "pricing model timed out".to_string(),
                        ))
                    }
                }
            }
        };

        Ok(price.max(MIN_PRICE_FRACTION * base_price).max(0.0))
    }

    /// Select an arm and price the request through it, returning a fully
    /// explainable decision trace.
    ///
    /// A pricing-model failure falls back to the base price and is recorded
    /// in the trace instead of failing the request; arm counters are never
    /// touched here.
    pub async fn route_request(
        &self,
        request_id: &str,
        event_id: &str,
        base_price: f64,
        context: &EventContext,
    ) -> (BanditDecision, bool) {
        let (arm_name, mut path) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let (idx, path) = Self::select_locked(&mut state, self.epsilon);
            (state.arms[idx].name.clone(), path)
        };

        let mut pricing_degraded = false;
        let final_price = match self.calculate_pricing(base_price, &arm_name, context).await {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    arm = %arm_name,
                    error = %e,
                    "Pricing failed, falling back to base price"
                );
                path.push(DecisionStep::PricingFallback {
                    reason: e.class().to_string(),
                });
                pricing_degraded = true;
                base_price
            }
        };
        path.push(DecisionStep::Priced {
            base_price,
            final_price,
        });

        (
            BanditDecision {
                request_id: request_id.to_string(),
                event_id: event_id.to_string(),
                selected_arm: arm_name,
                pricing: PricingOutput {
                    base_price,
                    final_price,
                },
                decision_path: path,
                timestamp: Utc::now(),
            },
            pricing_degraded,
        )
    }

    /// Snapshot of every arm's state, in registration order.
    pub fn arm_stats(&self) -> Vec<ArmStats> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .arms
            .iter()
            .map(|a| ArmStats {
                name: a.name.clone(),
                strategy: a.strategy,
                count: a.count,
                avg_reward: a.avg_reward,
                cumulative_reward: a.cumulative_reward,
            })
            .collect()
    }

    /// Sum of `count` across all arms.
    pub fn total_updates(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.arms.iter().map(|a| a.count).sum()
    }
}
