//! Incoming transaction and event context structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ticket purchase transaction submitted for scoring and pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    /// Unique transaction identifier
    pub transaction_id: String,

    /// Buyer wallet address
    pub wallet_address: String,

    /// Event the ticket belongs to
    pub event_id: String,

    /// Price paid by the buyer (base currency units)
    pub price_paid: f64,

    /// Submission timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl PurchaseTransaction {
    /// Create a new transaction with the required fields.
    pub fn new(
        transaction_id: impl Into<String>,
        wallet_address: impl Into<String>,
        event_id: impl Into<String>,
        price_paid: f64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            wallet_address: wallet_address.into(),
            event_id: event_id.into(),
            price_paid,
            created_at: Utc::now(),
        }
    }
}

/// Event-level context shared by the ensemble and the pricing strategies.
///
/// Fields are optional because the upstream source may not know them; every
/// consumer imputes a documented default instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    /// Demand signal in `[0, 1]`, higher means hotter event
    pub popularity_score: Option<f64>,

    /// Days remaining until the event starts (negative once it has started)
    pub days_until_event: Option<f64>,
}
