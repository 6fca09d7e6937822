//! Alert manager.
//!
//! Keeps a bounded FIFO of alerts shared by both monitoring loops. Appends
//! and evictions happen under one mutex.

mod models;

pub use models::*;

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Bounded, time-filtered alert log.
pub struct AlertManager {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
    retention: Duration,
}

impl AlertManager {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            retention,
        }
    }

    /// Create and append an alert stamped now.
    pub async fn add(&self, kind: AlertKind, message: impl Into<String>) -> Alert {
        let alert = Alert::new(kind, message, Utc::now());
        self.push(alert.clone()).await;
        alert
    }

    /// Append a fully formed alert, evicting the oldest past capacity.
    pub async fn push(&self, alert: Alert) {
        match alert.severity {
            Severity::Critical | Severity::High => {
                tracing::error!(
                    severity = ?alert.severity,
                    "Alert raised: {} - {}",
                    alert.kind,
                    alert.message
                );
            }
            Severity::Medium => {
                tracing::warn!("Alert raised: {} - {}", alert.kind, alert.message);
            }
        }

        let mut alerts = self.alerts.lock().await;
        alerts.push_back(alert);
        while alerts.len() > self.capacity {
            alerts.pop_front();
        }
    }

    /// Alerts within the configured retention window, oldest first.
    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.get_recent(self.retention).await
    }

    /// Alerts no older than `window`, oldest first.
    pub async fn get_recent(&self, window: Duration) -> Vec<Alert> {
        let now = Utc::now();
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| within_window(a, now, window))
            .cloned()
            .collect()
    }

    pub async fn count_recent(&self, window: Duration) -> usize {
        let now = Utc::now();
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| within_window(a, now, window))
            .count()
    }

    /// Number of retained alerts regardless of age.
    pub async fn len(&self) -> usize {
        self.alerts.lock().await.len()
    }
}

#[cfg(test)]
impl AlertManager {
    /// Hold the alert log, blocking every writer until the guard drops.
    pub(crate) async fn lock_entries(&self) -> tokio::sync::MutexGuard<'_, VecDeque<Alert>> {
        self.alerts.lock().await
    }
}

fn within_window(alert: &Alert, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - alert.timestamp).to_std() {
        Ok(age) => age <= window,
        // Stamped in the future.
        Err(_) => true,
    }
}
