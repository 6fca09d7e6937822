//! Aggregate server metrics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::registry::TargetRegistry;
use crate::tracker::round_to;

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetrics {
    pub total_targets: usize,
    pub healthy_targets: usize,
    pub system_health_percentage: f64,
    /// 0 when no target is critical.
    pub critical_health_percentage: f64,
    /// Alerts raised in the last hour.
    pub recent_alerts: usize,
    pub server_status: BTreeMap<String, bool>,
}

impl ServerMetrics {
    pub fn new(registry: &TargetRegistry, status: BTreeMap<String, bool>, recent_alerts: usize) -> Self {
        let total_targets = registry.len();
        let healthy_targets = status.values().filter(|healthy| **healthy).count();

        let critical_total = registry.critical().count();
        let critical_healthy = registry
            .critical()
            .filter(|t| status.get(&t.name).copied().unwrap_or(false))
            .count();

        Self {
            total_targets,
            healthy_targets,
            system_health_percentage: percentage(healthy_targets, total_targets),
            critical_health_percentage: percentage(critical_healthy, critical_total),
            recent_alerts,
            server_status: status,
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, 2)
}
