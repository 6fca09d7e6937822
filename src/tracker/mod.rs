//! Uptime tracking for monitored targets.
//!
//! Every outcome is applied under a single write guard, so concurrent
//! readers see either all or none of its effects.

mod stats;

pub use stats::*;

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::probe::ProbeOutcome;
use crate::registry::TargetRegistry;

/// Owns the [`TargetStats`] of every target.
pub struct UptimeTracker {
    stats: RwLock<HashMap<String, TargetStats>>,
    latency_capacity: usize,
}

impl UptimeTracker {
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            latency_capacity,
        }
    }

    /// Apply an outcome and return the target's consecutive failure count
    /// after the update.
    pub async fn record(&self, outcome: &ProbeOutcome) -> u32 {
        let mut stats = self.stats.write().await;
        let entry = stats
            .entry(outcome.target.clone())
            .or_insert_with(|| TargetStats::new(self.latency_capacity));
        entry.apply(outcome);
        entry.consecutive_failures
    }

    /// Uptime percentage, 0 for unknown or never-checked targets.
    pub async fn get_uptime_percentage(&self, target: &str) -> f64 {
        self.stats
            .read()
            .await
            .get(target)
            .map(TargetStats::uptime_percentage)
            .unwrap_or(0.0)
    }

    pub async fn is_healthy(&self, target: &str) -> bool {
        self.stats.read().await.get(target).is_some_and(|s| s.healthy)
    }

    /// Health of every registered target, read under one guard.
    pub async fn status_all(&self, registry: &TargetRegistry) -> BTreeMap<String, bool> {
        let stats = self.stats.read().await;
        registry
            .iter()
            .map(|t| (t.name.clone(), stats.get(&t.name).is_some_and(|s| s.healthy)))
            .collect()
    }

    /// Detailed status of every registered target, read under one guard.
    pub async fn snapshot_all(&self, registry: &TargetRegistry) -> BTreeMap<String, DetailedStatus> {
        let stats = self.stats.read().await;
        registry
            .iter()
            .map(|t| (t.name.clone(), DetailedStatus::from_stats(t, stats.get(&t.name))))
            .collect()
    }
}

#[cfg(test)]
impl UptimeTracker {
    pub async fn stats(&self, target: &str) -> Option<TargetStats> {
        self.stats.read().await.get(target).cloned()
    }

    pub async fn snapshot(&self, target: &crate::registry::Target) -> DetailedStatus {
        let stats = self.stats.read().await;
        DetailedStatus::from_stats(target, stats.get(&target.name))
    }
}
