//! External collaborator interfaces.
//!
//! The core is format-agnostic: persistence, feature lookups, outcome feeds
//! and the external pricing model are injected behind these traits. In-memory
//! implementations are provided so the binary and tests run without any
//! external service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::error::EngineError;
use crate::types::decision::DecisionRecord;
use crate::types::transaction::EventContext;

/// Raw wallet/event attributes returned by a feature lookup.
///
/// Every field is optional: the feature engineer imputes 0.0 for anything the
/// source does not know rather than failing the vector.
#[derive(Debug, Clone, Default)]
pub struct WalletEventAttributes {
    pub wallet_created_at: Option<DateTime<Utc>>,
    pub wallet_tx_count: Option<u64>,
    pub wallet_tx_last_hour: Option<u64>,
    pub wallet_active_days: Option<u64>,
    pub wallet_avg_ticket_price: Option<f64>,
    pub wallet_last_tx_at: Option<DateTime<Utc>>,
    pub event_created_at: Option<DateTime<Utc>>,
    pub event_starts_at: Option<DateTime<Utc>>,
    pub event_popularity_score: Option<f64>,
    pub event_avg_price: Option<f64>,
}

/// Source of raw wallet/event attributes for feature derivation.
#[async_trait]
pub trait FeatureDataSource: Send + Sync {
    /// Look up attributes as of a point in time.
    ///
    /// Returns [`EngineError::DataUnavailable`] when the source cannot serve
    /// the lookup at all.
    async fn lookup(
        &self,
        wallet_address: &str,
        event_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<WalletEventAttributes, EngineError>;
}

/// Append-only decision log with windowed queries and at-most-once reward
/// marking.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    /// Append a finished decision record.
    async fn append(&self, record: DecisionRecord) -> Result<(), EngineError>;

    /// Records created inside `[start, end)`, at most `limit` of them.
    ///
    /// When the window holds more than `limit` records the newest by
    /// `created_at` are kept, so the bound is enforced at the store and an
    /// oversized window never materializes in full for the caller.
    async fn query_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, EngineError>;

    /// Attach an observed reward to a record, at most once.
    ///
    /// Returns the newly marked record, or `None` when the record was already
    /// marked (the duplicate is a no-op). Unknown request ids are an error.
    async fn mark_reward(
        &self,
        request_id: &str,
        reward: f64,
        finalized_at: DateTime<Utc>,
    ) -> Result<Option<DecisionRecord>, EngineError>;
}

/// Asynchronous feed of observed purchase outcomes.
#[async_trait]
pub trait RewardObserver: Send + Sync {
    /// Next observed outcome, or `None` when the feed has ended.
    async fn next_outcome(&self) -> Option<ObservedOutcome>;
}

/// One observed outcome keyed by the decision's request id.
#[derive(Debug, Clone)]
pub struct ObservedOutcome {
    pub request_id: String,
    /// Scalar outcome signal, e.g. normalized conversion/profit
    pub reward: f64,
}

/// External pricing model backing the `ml_pricing` arm.
#[async_trait]
pub trait PricingModel: Send + Sync {
    /// Score a price for the given base price and event context.
    async fn score(&self, base_price: f64, context: &EventContext) -> Result<f64, EngineError>;
}

/// In-memory decision log backed by a `RwLock`-guarded vector.
///
/// Suitable for tests and the demo binary; a production deployment injects a
/// store-backed implementation instead.
#[derive(Default)]
pub struct MemoryDecisionLog {
    records: RwLock<Vec<DecisionRecord>>,
}

impl MemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DecisionLog for MemoryDecisionLog {
    async fn append(&self, record: DecisionRecord) -> Result<(), EngineError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| EngineError::ServiceUnavailable(format!("log lock poisoned: {e}")))?;
        debug!(request_id = %record.request_id, "Appended decision record");
        records.push(record);
        Ok(())
    }

    async fn query_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, EngineError> {
        let records = self
            .records
            .read()
            .map_err(|e| EngineError::ServiceUnavailable(format!("log lock poisoned: {e}")))?;
        let mut matched: Vec<DecisionRecord> = records
            .iter()
            .filter(|r| r.created_at >= start && r.created_at < end)
            .cloned()
            .collect();
        if matched.len() > limit {
            matched.sort_by_key(|r| r.created_at);
            matched.drain(..matched.len() - limit);
        }
        Ok(matched)
    }

    async fn mark_reward(
        &self,
        request_id: &str,
        reward: f64,
        finalized_at: DateTime<Utc>,
    ) -> Result<Option<DecisionRecord>, EngineError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| EngineError::ServiceUnavailable(format!("log lock poisoned: {e}")))?;

        let record = records
            .iter_mut()
            .find(|r| r.request_id == request_id)
            .ok_or_else(|| {
                EngineError::DataUnavailable(format!("no decision record for {request_id}"))
            })?;

        if record.reward.is_some() {
            return Ok(None);
        }

        record.reward = Some(reward);
        record.finalized_at = Some(finalized_at);
        Ok(Some(record.clone()))
    }
}

/// Static feature source serving a fixed attribute table, keyed by wallet.
///
/// Unknown wallets produce `DataUnavailable`, which exercises the imputation
/// path downstream.
#[derive(Default)]
pub struct StaticFeatureSource {
    wallets: HashMap<String, WalletEventAttributes>,
}

impl StaticFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register attributes for a wallet.
    pub fn insert(&mut self, wallet_address: impl Into<String>, attrs: WalletEventAttributes) {
        self.wallets.insert(wallet_address.into(), attrs);
    }
}

#[async_trait]
impl FeatureDataSource for StaticFeatureSource {
    async fn lookup(
        &self,
        wallet_address: &str,
        _event_id: &str,
        _as_of: DateTime<Utc>,
    ) -> Result<WalletEventAttributes, EngineError> {
        self.wallets
            .get(wallet_address)
            .cloned()
            .ok_or_else(|| EngineError::DataUnavailable(format!("unknown wallet {wallet_address}")))
    }
}

/// Reward observer backed by a tokio mpsc channel.
pub struct ChannelRewardObserver {
    receiver: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<ObservedOutcome>>,
}

impl ChannelRewardObserver {
    /// Create an observer and the sender side used to feed outcomes in.
    pub fn new(capacity: usize) -> (tokio::sync::mpsc::Sender<ObservedOutcome>, Self) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (
            tx,
            Self {
                receiver: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl RewardObserver for ChannelRewardObserver {
    async fn next_outcome(&self) -> Option<ObservedOutcome> {
        self.receiver.lock().await.recv().await
    }
}
