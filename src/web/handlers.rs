//! HTTP request handlers.
//!
//! Handlers only read monitor snapshots, so they always answer with a
//! well-formed body.

use super::AppState;
use crate::alerts::Alert;
use crate::monitor::ServerMetrics;
use crate::verify::{MethodStatus, PaymentMetrics, VerificationVerdict};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Overview
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<&'static str, &'static str>,
    pub payment_automation_active: bool,
    pub critical_service_down: bool,
    pub server_health: BTreeMap<String, bool>,
}

pub async fn handle_overview(State(state): State<AppState>) -> impl IntoResponse {
    let server_health = state.monitor.get_all_status().await;
    let automation_active = state.monitor.is_automation_active().await;
    let critical_down = state.monitor.is_critical_service_down().await;
    let loops = if state.monitor.is_running().await { "active" } else { "stopped" };

    let healthy = automation_active && server_health.values().all(|up| *up);

    Json(OverviewResponse {
        status: if healthy { "healthy" } else { "degraded" },
        timestamp: Utc::now(),
        services: BTreeMap::from([("payment_verifier", loops), ("server_monitor", loops)]),
        payment_automation_active: automation_active,
        critical_service_down: critical_down,
        server_health,
    })
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

// ============================================================================
// Server status
// ============================================================================

pub async fn handle_server_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.get_detailed_status().await)
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub server_metrics: ServerMetrics,
    pub payment_metrics: PaymentMetrics,
    pub timestamp: DateTime<Utc>,
}

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(MetricsResponse {
        server_metrics: state.monitor.get_metrics().await,
        payment_metrics: state.monitor.get_payment_metrics().await,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Window in hours; the configured retention when absent.
    #[serde(default)]
    pub hours: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub total_alerts: usize,
}

pub async fn handle_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let window = query.hours.map(|h| Duration::from_secs(h.saturating_mul(3600)));
    let alerts = state.monitor.get_alerts(window).await;

    Json(AlertsResponse {
        total_alerts: alerts.len(),
        alerts,
    })
}

// ============================================================================
// Payment verification
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub automated_payments_count: u64,
    pub failed_payments_count: u64,
    pub total_processed: u64,
    pub last_verification: Option<DateTime<Utc>>,
    pub payment_methods_status: BTreeMap<String, MethodStatus>,
    pub last_verdict: Option<VerificationVerdict>,
}

pub async fn handle_payment_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.monitor.get_payment_stats().await;

    Json(PaymentStatusResponse {
        automated_payments_count: stats.automated_count,
        failed_payments_count: stats.failed_count,
        total_processed: stats.total_processed,
        last_verification: stats.last_verification,
        payment_methods_status: state.monitor.get_payment_method_status().await,
        last_verdict: state.monitor.last_verdict().await,
    })
}

pub async fn handle_verify_payments(State(state): State<AppState>) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    tokio::spawn(async move {
        if let Err(e) = monitor.trigger_verification_now().await {
            tracing::error!("Triggered verification failed: {}", e);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Payment verification triggered" })),
    )
}

// ============================================================================
// Control
// ============================================================================

pub async fn handle_restart_monitoring(State(state): State<AppState>) -> impl IntoResponse {
    state.monitor.restart().await;
    Json(json!({ "message": "Monitoring services restarted successfully" }))
}
