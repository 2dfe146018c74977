//! Rolling-window business KPIs computed from the decision log.
//!
//! Every KPI is a pure reduction over the window's records: nothing here
//! mutates bandit or ensemble state. Empty windows yield 0.0, never an error.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::EngineError;
use crate::sources::DecisionLog;
use crate::types::decision::{DecisionRecord, KpiSnapshot, RiskLevel};

/// Default trailing window when the caller does not override it.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Computes rolling business metrics from the decision log.
pub struct KpiCalculator {
    log: Arc<dyn DecisionLog>,
    default_window_hours: u32,
    /// Upper bound on records considered per query, newest kept. Passed down
    /// to the log so an oversized window is truncated at the store, not here.
    max_scan_records: usize,
}

impl KpiCalculator {
    pub fn new(log: Arc<dyn DecisionLog>, default_window_hours: u32, max_scan_records: usize) -> Self {
        Self {
            log,
            default_window_hours,
            max_scan_records,
        }
    }

    async fn window_records(
        &self,
        window_hours: Option<u32>,
    ) -> Result<(Vec<DecisionRecord>, u32), EngineError> {
        let hours = window_hours.unwrap_or(self.default_window_hours);
        let end = Utc::now();
        let start = end - Duration::hours(hours as i64);

        let records = self
            .log
            .query_window(start, end, self.max_scan_records)
            .await?;
        debug!(window_hours = hours, records = records.len(), "KPI window scanned");
        Ok((records, hours))
    }

    fn snapshot(name: &str, value: f64, window_hours: u32) -> KpiSnapshot {
        KpiSnapshot {
            kpi_name: name.to_string(),
            value,
            computed_at: Utc::now(),
            window_hours,
        }
    }

    /// Fraction of decisions in the window whose observed outcome converted.
    pub async fn conversion_rate(
        &self,
        window_hours: Option<u32>,
    ) -> Result<KpiSnapshot, EngineError> {
        let (records, hours) = self.window_records(window_hours).await?;
        let value = if records.is_empty() {
            0.0
        } else {
            let converted = records.iter().filter(|r| r.converted()).count();
            converted as f64 / records.len() as f64
        };
        Ok(Self::snapshot("conversion_rate", value, hours))
    }

    /// Mean seconds between decision creation and outcome finalization, over
    /// the finalized records in the window.
    pub async fn time_to_finality(
        &self,
        window_hours: Option<u32>,
    ) -> Result<KpiSnapshot, EngineError> {
        let (records, hours) = self.window_records(window_hours).await?;
        let finalized: Vec<f64> = records
            .iter()
            .filter_map(|r| {
                r.finalized_at
                    .map(|t| (t - r.created_at).num_milliseconds() as f64 / 1000.0)
            })
            .collect();
        let value = if finalized.is_empty() {
            0.0
        } else {
            finalized.iter().sum::<f64>() / finalized.len() as f64
        };
        Ok(Self::snapshot("time_to_finality", value, hours))
    }

    /// Revenue from converted decisions divided by the window length.
    pub async fn revenue_per_hour(
        &self,
        window_hours: Option<u32>,
    ) -> Result<KpiSnapshot, EngineError> {
        let (records, hours) = self.window_records(window_hours).await?;
        let revenue: f64 = records
            .iter()
            .filter(|r| r.converted())
            .map(|r| r.bandit.pricing.final_price)
            .sum();
        let value = if hours == 0 { 0.0 } else { revenue / hours as f64 };
        Ok(Self::snapshot("revenue_per_hour", value, hours))
    }

    /// Fraction of decisions in the window flagged as high risk.
    pub async fn fraud_detection_rate(
        &self,
        window_hours: Option<u32>,
    ) -> Result<KpiSnapshot, EngineError> {
        let (records, hours) = self.window_records(window_hours).await?;
        let value = if records.is_empty() {
            0.0
        } else {
            let flagged = records
                .iter()
                .filter(|r| r.risk.risk_level == RiskLevel::High)
                .count();
            flagged as f64 / records.len() as f64
        };
        Ok(Self::snapshot("fraud_detection_rate", value, hours))
    }

    /// All four KPIs over one window, keyed by KPI name.
    pub async fn get_all_kpis(
        &self,
        window_hours: Option<u32>,
    ) -> Result<HashMap<String, KpiSnapshot>, EngineError> {
        let mut kpis = HashMap::new();
        for snapshot in [
            self.conversion_rate(window_hours).await?,
            self.time_to_finality(window_hours).await?,
            self.revenue_per_hour(window_hours).await?,
            self.fraud_detection_rate(window_hours).await?,
        ] {
            kpis.insert(snapshot.kpi_name.clone(), snapshot);
        }
        Ok(kpis)
    }
}
