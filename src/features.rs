//! Feature derivation for fraud scoring.
//!
//! Transforms raw wallet/event attributes into the fixed 10-entry feature
//! vector the scoring models expect. Missing attributes are imputed to 0.0 so
//! downstream consumers never branch on vector size. Also provides the batch
//! derivation used for offline feature backfills.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sources::{FeatureDataSource, WalletEventAttributes};
use crate::types::features::{FeatureVector, FEATURE_COUNT};

/// Feature vector plus whether the source actually served the lookup.
///
/// When the source was unavailable the vector holds the documented defaults
/// and the orchestrator flags the decision as degraded.
#[derive(Debug, Clone)]
pub struct ComputedFeatures {
    pub vector: FeatureVector,
    pub source_available: bool,
    /// Event context extracted alongside the features, reused by the
    /// ensemble and the pricing strategies
    pub event: crate::types::transaction::EventContext,
}

/// Derives feature vectors from an injected [`FeatureDataSource`].
///
/// Pure beyond the injected lookup: identical source data at an identical
/// as-of time always yields an identical vector.
pub struct FeatureEngineer {
    source: Arc<dyn FeatureDataSource>,
}

impl FeatureEngineer {
    pub fn new(source: Arc<dyn FeatureDataSource>) -> Self {
        Self { source }
    }

    /// Compute the feature vector for one transaction as of `as_of`.
    ///
    /// Never fails: a `DataUnavailable` lookup falls back to the all-default
    /// vector, reported through `source_available`.
    pub async fn compute_features(
        &self,
        transaction_id: &str,
        wallet_address: &str,
        event_id: &str,
        as_of: DateTime<Utc>,
    ) -> ComputedFeatures {
        match self.source.lookup(wallet_address, event_id, as_of).await {
            Ok(attrs) => {
                let vector = Self::vector_from_attributes(&attrs, as_of);
                let event = crate::types::transaction::EventContext {
                    popularity_score: attrs.event_popularity_score,
                    days_until_event: attrs
                        .event_starts_at
                        .map(|t| (t - as_of).num_seconds() as f64 / 86_400.0),
                };
                debug!(
                    transaction_id = %transaction_id,
                    wallet = %wallet_address,
                    "Feature vector computed"
                );
                ComputedFeatures {
                    vector,
                    source_available: true,
                    event,
                }
            }
            Err(e) => {
                warn!(
                    transaction_id = %transaction_id,
                    wallet = %wallet_address,
                    error = %e,
                    "Feature lookup failed, imputing defaults"
                );
                ComputedFeatures {
                    vector: FeatureVector::zeroed(),
                    source_available: false,
                    event: crate::types::transaction::EventContext::default(),
                }
            }
        }
    }

    fn vector_from_attributes(attrs: &WalletEventAttributes, as_of: DateTime<Utc>) -> FeatureVector {
        let hours = |from: DateTime<Utc>, to: DateTime<Utc>| (to - from).num_seconds() as f64 / 3600.0;

        let tx_count = attrs.wallet_tx_count.unwrap_or(0);
        let active_days = attrs.wallet_active_days.unwrap_or(0).max(1);

        let mut values = [0.0; FEATURE_COUNT];
        values[0] = attrs.wallet_tx_last_hour.unwrap_or(0) as f64;
        values[1] = attrs
            .wallet_created_at
            .map(|t| hours(t, as_of) / 24.0)
            .unwrap_or(0.0);
        values[2] = attrs.event_popularity_score.unwrap_or(0.0);
        values[3] = tx_count as f64 / active_days as f64;
        values[4] = attrs
            .event_created_at
            .map(|t| hours(t, as_of))
            .unwrap_or(0.0);
        values[5] = attrs
            .wallet_last_tx_at
            .map(|t| hours(t, as_of))
            .unwrap_or(0.0);
        values[6] = tx_count as f64;
        values[7] = attrs.wallet_avg_ticket_price.unwrap_or(0.0);
        values[8] = attrs.event_avg_price.unwrap_or(0.0);
        values[9] = attrs
            .event_starts_at
            .map(|t| hours(as_of, t))
            .unwrap_or(0.0);

        FeatureVector::from_values(values)
    }
}

/// One raw event row fed to the batch derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionRow {
    pub transaction_id: String,
    pub wallet_address: String,
    pub event_id: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub event_created_at: DateTime<Utc>,
}

/// A raw row with the derived columns attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedTransactionRow {
    #[serde(flatten)]
    pub raw: RawTransactionRow,
    /// Wallet-level transaction velocity: `count / max(1, distinct_active_days)`
    pub avg_tx_per_day: f64,
    /// Hours between the event's creation and this transaction
    pub event_lag: f64,
    /// Hours since the same wallet's previous transaction, 0.0 for the first
    pub user_activity_delta: f64,
}

/// Batch derivation used for offline feature backfills.
///
/// Derived columns are computed per wallet group and never leak information
/// across wallets. Output preserves the input row order.
pub fn compute_derived_features(rows: &[RawTransactionRow]) -> Vec<DerivedTransactionRow> {
    // Indices per wallet, ordered by timestamp within each group.
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups.entry(row.wallet_address.as_str()).or_default().push(i);
    }

    let mut avg_tx_per_day = vec![0.0; rows.len()];
    let mut activity_delta = vec![0.0; rows.len()];

    for indices in groups.values_mut() {
        indices.sort_by_key(|&i| rows[i].created_at);

        let distinct_days = {
            let mut days: Vec<_> = indices.iter().map(|&i| rows[i].created_at.date_naive()).collect();
            days.sort();
            days.dedup();
            days.len().max(1)
        };
        let velocity = indices.len() as f64 / distinct_days as f64;

        let mut prev: Option<DateTime<Utc>> = None;
        for &i in indices.iter() {
            avg_tx_per_day[i] = velocity;
            activity_delta[i] = prev
                .map(|p| (rows[i].created_at - p).num_seconds() as f64 / 3600.0)
                .unwrap_or(0.0);
            prev = Some(rows[i].created_at);
        }
    }

    rows.iter()
        .enumerate()
        .map(|(i, row)| DerivedTransactionRow {
            raw: row.clone(),
            avg_tx_per_day: avg_tx_per_day[i],
            event_lag: (row.created_at - row.event_created_at).num_seconds() as f64 / 3600.0,
            user_activity_delta: activity_delta[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticFeatureSource;
    use chrono::{Duration, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn full_attributes() -> WalletEventAttributes {
        let t = as_of();
        WalletEventAttributes {
            wallet_created_at: Some(t - Duration::days(30)),
            wallet_tx_count: Some(12),
            wallet_tx_last_hour: Some(3),
            wallet_active_days: Some(6),
            wallet_avg_ticket_price: Some(85.0),
            wallet_last_tx_at: Some(t - Duration::hours(2)),
            event_created_at: Some(t - Duration::days(10)),
            event_starts_at: Some(t + Duration::days(5)),
            event_popularity_score: Some(0.8),
            event_avg_price: Some(110.0),
        }
    }

    #[tokio::test]
    async fn test_full_vector_from_known_wallet() {
        let mut source = StaticFeatureSource::new();
        source.insert("0xw1", full_attributes());
        let engineer = FeatureEngineer::new(Arc::new(source));

        let computed = engineer
            .compute_features("tx_1", "0xw1", "evt_1", as_of())
            .await;

        assert!(computed.source_available);
        let v = &computed.vector;
        assert_eq!(v.as_slice().len(), FEATURE_COUNT);
        assert!(v.as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(v.get("txn_velocity_1h"), Some(3.0));
        assert_eq!(v.get("wallet_age_days"), Some(30.0));
        assert_eq!(v.get("avg_tx_per_day"), Some(2.0));
        assert_eq!(v.get("user_activity_delta"), Some(2.0));
        assert_eq!(v.get("hours_until_event"), Some(120.0));
        assert_eq!(computed.event.popularity_score, Some(0.8));
        assert_eq!(computed.event.days_until_event, Some(5.0));
    }

    #[tokio::test]
    async fn test_unknown_wallet_imputes_defaults() {
        let engineer = FeatureEngineer::new(Arc::new(StaticFeatureSource::new()));

        let computed = engineer
            .compute_features("tx_1", "0xghost", "evt_1", as_of())
            .await;

        assert!(!computed.source_available);
        assert_eq!(computed.vector, FeatureVector::zeroed());
    }

    #[tokio::test]
    async fn test_partial_attributes_impute_per_field() {
        let mut source = StaticFeatureSource::new();
        source.insert(
            "0xw1",
            WalletEventAttributes {
                wallet_tx_count: Some(4),
                ..Default::default()
            },
        );
        let engineer = FeatureEngineer::new(Arc::new(source));

        let computed = engineer
            .compute_features("tx_1", "0xw1", "evt_1", as_of())
            .await;

        assert!(computed.source_available);
        assert_eq!(computed.vector.get("wallet_tx_count"), Some(4.0));
        // active_days missing -> clamped to 1 day
        assert_eq!(computed.vector.get("avg_tx_per_day"), Some(4.0));
        assert_eq!(computed.vector.get("event_popularity_score"), Some(0.0));
    }

    fn row(
        id: &str,
        wallet: &str,
        created_hours_ago: i64,
        event_created_hours_ago: i64,
    ) -> RawTransactionRow {
        let t = as_of();
        RawTransactionRow {
            transaction_id: id.to_string(),
            wallet_address: wallet.to_string(),
            event_id: "evt_1".to_string(),
            price: 100.0,
            created_at: t - Duration::hours(created_hours_ago),
            event_created_at: t - Duration::hours(event_created_hours_ago),
        }
    }

    #[test]
    fn test_derived_features_grouped_per_wallet() {
        let rows = vec![
            row("t1", "w1", 30, 100),
            row("t2", "w2", 20, 100),
            row("t3", "w1", 10, 100),
        ];

        let derived = compute_derived_features(&rows);
        assert_eq!(derived.len(), 3);

        // Output preserves input order
        assert_eq!(derived[0].raw.transaction_id, "t1");
        assert_eq!(derived[1].raw.transaction_id, "t2");

        // First transaction of each wallet has zero delta
        assert_eq!(derived[0].user_activity_delta, 0.0);
        assert_eq!(derived[1].user_activity_delta, 0.0);
        // w1's second transaction is 20h after its first
        assert_eq!(derived[2].user_activity_delta, 20.0);

        // event_lag = created_at - event_created_at, in hours
        assert_eq!(derived[0].event_lag, 70.0);
        assert_eq!(derived[2].event_lag, 90.0);
    }

    #[test]
    fn test_avg_tx_per_day_uses_distinct_active_days() {
        // Three transactions across two distinct days for one wallet
        let rows = vec![
            row("t1", "w1", 1, 100),
            row("t2", "w1", 2, 100),
            row("t3", "w1", 26, 100),
        ];

        let derived = compute_derived_features(&rows);
        for d in &derived {
            assert!((d.avg_tx_per_day - 1.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_derived_features_empty_input() {
        assert!(compute_derived_features(&[]).is_empty());
    }
}
