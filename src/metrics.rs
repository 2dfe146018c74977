//! Operational metrics for the decision engine.
//!
//! Tracks decision throughput, degradation and latency. Distinct from the
//! business KPIs in [`crate::kpi`]: these are in-process counters for
//! observability, not reductions over the decision log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared across request workers.
pub struct EngineMetrics {
    /// Total decisions produced
    pub decisions_processed: AtomicU64,
    /// Decisions flagged degraded
    pub degraded_decisions: AtomicU64,
    /// Rewards applied to the bandit
    pub rewards_applied: AtomicU64,
    /// Duplicate reward observations dropped by the idempotence check
    pub duplicate_rewards: AtomicU64,
    /// Decision latencies in microseconds
    processing_times: RwLock<Vec<u64>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Selections per arm
    arm_selections: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            decisions_processed: AtomicU64::new(0),
            degraded_decisions: AtomicU64::new(0),
            rewards_applied: AtomicU64::new(0),
            duplicate_rewards: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            arm_selections: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one finished decision.
    pub fn record_decision(
        &self,
        latency: Duration,
        risk_score: f64,
        selected_arm: &str,
        degraded: bool,
    ) {
        self.decisions_processed.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_decisions.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10_000 {
                times.drain(0..5000);
            }
        }

        let bucket = ((risk_score * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }

        if let Ok(mut arms) = self.arm_selections.write() {
            *arms.entry(selected_arm.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the outcome of one reward observation.
    pub fn record_reward(&self, duplicate: bool) {
        if duplicate {
            self.duplicate_rewards.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rewards_applied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Latency statistics over the retained samples.
    pub fn processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(t) => t,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
        }
    }

    /// Decisions per second since startup.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.decisions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Selections recorded per arm.
    pub fn arm_selections(&self) -> HashMap<String, u64> {
        self.arm_selections
            .read()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Risk score histogram, ten 0.1-wide buckets.
    pub fn score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Log a structured summary of everything tracked.
    pub fn log_summary(&self) {
        let decisions = self.decisions_processed.load(Ordering::Relaxed);
        let degraded = self.degraded_decisions.load(Ordering::Relaxed);
        let stats = self.processing_stats();

        info!(
            decisions = decisions,
            degraded = degraded,
            rewards_applied = self.rewards_applied.load(Ordering::Relaxed),
            duplicate_rewards = self.duplicate_rewards.load(Ordering::Relaxed),
            throughput = format!("{:.1}/s", self.throughput()),
            latency_mean_us = stats.mean_us,
            latency_p95_us = stats.p95_us,
            latency_p99_us = stats.p99_us,
            "Engine metrics summary"
        );
        for (arm, count) in self.arm_selections() {
            let share = if decisions > 0 {
                count as f64 / decisions as f64 * 100.0
            } else {
                0.0
            };
            info!(arm = %arm, selections = count, share = format!("{share:.1}%"), "Arm usage");
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics in microseconds.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Periodically logs the metrics summary.
pub struct MetricsReporter {
    metrics: std::sync::Arc<EngineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<EngineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Run the periodic reporting loop. Never returns; spawn it.
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_recording() {
        let metrics = EngineMetrics::new();

        metrics.record_decision(Duration::from_micros(120), 0.2, "baseline", false);
        metrics.record_decision(Duration::from_micros(340), 0.85, "surge_pricing", true);

        assert_eq!(metrics.decisions_processed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.degraded_decisions.load(Ordering::Relaxed), 1);

        let dist = metrics.score_distribution();
        assert_eq!(dist[2], 1);
        assert_eq!(dist[8], 1);

        let arms = metrics.arm_selections();
        assert_eq!(arms.get("baseline"), Some(&1));
        assert_eq!(arms.get("surge_pricing"), Some(&1));
    }

    #[test]
    fn test_reward_recording_separates_duplicates() {
        let metrics = EngineMetrics::new();
        metrics.record_reward(false);
        metrics.record_reward(false);
        metrics.record_reward(true);

        assert_eq!(metrics.rewards_applied.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.duplicate_rewards.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_processing_stats_on_empty() {
        let metrics = EngineMetrics::new();
        let stats = metrics.processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_us, 0);
    }

    #[test]
    fn test_top_score_bucket_clamped() {
        let metrics = EngineMetrics::new();
        metrics.record_decision(Duration::from_micros(10), 1.0, "baseline", false);
        assert_eq!(metrics.score_distribution()[9], 1);
    }
}
