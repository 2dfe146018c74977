//! Fixed-width feature vector consumed by the scoring models.

use serde::{Deserialize, Serialize};

/// Number of features in every vector. Downstream consumers never branch on
/// vector size: missing inputs are imputed to 0.0, not omitted.
pub const FEATURE_COUNT: usize = 10;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "txn_velocity_1h",
    "wallet_age_days",
    "event_popularity_score",
    "avg_tx_per_day",
    "event_lag",
    "user_activity_delta",
    "wallet_tx_count",
    "avg_ticket_price",
    "event_avg_price",
    "hours_until_event",
];

/// Immutable feature vector for one transaction.
///
/// Always exactly [`FEATURE_COUNT`] finite entries, ordered as
/// [`FEATURE_NAMES`]. Non-finite inputs are coerced to the 0.0 default at
/// construction so no NaN ever reaches a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Build a vector from values in [`FEATURE_NAMES`] order.
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        let mut sanitized = values;
        for v in sanitized.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        Self { values: sanitized }
    }

    /// All-zero vector, the documented fallback when no source data exists.
    pub fn zeroed() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    /// Look up a feature by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Iterate `(name, value)` pairs in vector order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES
            .iter()
            .zip(self.values.iter())
            .map(|(n, v)| (*n, *v))
    }
}
