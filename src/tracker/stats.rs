//! Per-target rolling statistics.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::probe::{FailureReason, ProbeOutcome};
use crate::registry::{Target, Tier};

/// How many recent latencies a detailed status exposes.
pub const RECENT_LATENCY_COUNT: usize = 10;

/// Rolling statistics for one target.
#[derive(Debug, Clone)]
pub struct TargetStats {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub consecutive_failures: u32,
    /// Health according to the most recent probe.
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureReason>,
    latencies: VecDeque<Duration>,
    latency_capacity: usize,
}

impl TargetStats {
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            total_checks: 0,
            successful_checks: 0,
            consecutive_failures: 0,
            healthy: false,
            last_check: None,
            last_success: None,
            last_failure: None,
            latencies: VecDeque::with_capacity(latency_capacity),
            latency_capacity,
        }
    }

    /// Fold one outcome into the statistics.
    pub fn apply(&mut self, outcome: &ProbeOutcome) {
        self.total_checks += 1;
        self.last_check = Some(outcome.timestamp);
        self.healthy = outcome.healthy;

        if outcome.healthy {
            self.successful_checks += 1;
            self.consecutive_failures = 0;
            self.last_success = Some(outcome.timestamp);
            self.push_latency(outcome.latency);
        } else {
            self.consecutive_failures += 1;
            self.last_failure = outcome.failure;
        }
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latency_capacity == 0 {
            return;
        }
        self.latencies.push_back(latency);
        while self.latencies.len() > self.latency_capacity {
            self.latencies.pop_front();
        }
    }

    /// Percentage of successful checks, 0 when never checked.
    pub fn uptime_percentage(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.successful_checks as f64 / self.total_checks as f64 * 100.0
    }

    pub fn average_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    /// Latencies oldest first.
    pub fn latencies(&self) -> impl Iterator<Item = &Duration> {
        self.latencies.iter()
    }
}

/// Read-only view of a target's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStatus {
    pub status: String,
    pub url: String,
    pub tier: Tier,
    pub uptime_percentage: f64,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<FailureReason>,
    /// Seconds.
    pub average_response_time: f64,
    /// Seconds, oldest first.
    pub recent_response_times: Vec<f64>,
}

impl DetailedStatus {
    pub fn from_stats(target: &Target, stats: Option<&TargetStats>) -> Self {
        let Some(stats) = stats else {
            return Self {
                status: "unhealthy".to_string(),
                url: target.endpoint.clone(),
                tier: target.tier,
                uptime_percentage: 0.0,
                total_checks: 0,
                successful_checks: 0,
                consecutive_failures: 0,
                last_check: None,
                last_success: None,
                last_failure: None,
                average_response_time: 0.0,
                recent_response_times: Vec::new(),
            };
        };

        let skip = stats.latencies.len().saturating_sub(RECENT_LATENCY_COUNT);

        Self {
            status: if stats.healthy { "healthy" } else { "unhealthy" }.to_string(),
            url: target.endpoint.clone(),
            tier: target.tier,
            uptime_percentage: round_to(stats.uptime_percentage(), 2),
            total_checks: stats.total_checks,
            successful_checks: stats.successful_checks,
            consecutive_failures: stats.consecutive_failures,
            last_check: stats.last_check,
            last_success: stats.last_success,
            last_failure: stats.last_failure,
            average_response_time: stats
                .average_latency()
                .map(|d| round_to(d.as_secs_f64(), 3))
                .unwrap_or(0.0),
            recent_response_times: stats.latencies().skip(skip).map(Duration::as_secs_f64).collect(),
        }
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
