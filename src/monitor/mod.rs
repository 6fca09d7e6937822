//! Monitor coordinator.
//!
//! Drives two independent loops: server health checks and payment
//! verification. Each loop runs its cycles as spawned tasks so a failing
//! cycle is logged and retried after a backoff instead of ending the loop.

mod metrics;

pub use metrics::*;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinError, JoinHandle};

use crate::alerts::{Alert, AlertKind, AlertManager};
use crate::config::MonitorConfig;
use crate::probe::{FailureReason, ProbeOutcome, Prober};
use crate::registry::TargetRegistry;
use crate::tracker::{DetailedStatus, UptimeTracker};
use crate::verify::{MethodStatus, PaymentMetrics, VerificationEngine, VerificationStats, VerificationVerdict};

/// Window used for the recent alert count in metrics.
const METRICS_ALERT_WINDOW: Duration = Duration::from_secs(3600);

/// Cycle-level error types.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("probe task for {target} failed: {source}")]
    ProbeTask {
        target: String,
        #[source]
        source: JoinError,
    },
    #[error("aggregation task failed: {0}")]
    AggregationTask(#[source] JoinError),
    #[error("verification task failed: {0}")]
    VerificationTask(#[source] JoinError),
    #[error("payment method refresh failed: {0}")]
    MethodRefreshTask(#[source] JoinError),
}

/// Loop cadence: delay between cycles and backoff after a failed one.
#[derive(Debug, Clone, Copy)]
struct Cadence {
    interval: Duration,
    backoff: Duration,
}

/// State shared between the loops and the query surface.
struct MonitorCore {
    registry: Arc<TargetRegistry>,
    tracker: UptimeTracker,
    alerts: Arc<AlertManager>,
    verifier: Arc<VerificationEngine>,
    prober: Prober,
    failure_threshold: u32,
}

impl MonitorCore {
    /// Probe every target concurrently, then fold the outcomes in.
    async fn run_server_cycle(self: &Arc<Self>) -> Result<(), MonitorError> {
        tracing::debug!("Checking all server health");

        // 1. Fan out: one task per target. Each probe bounds its own wait.
        let handles: Vec<(String, JoinHandle<ProbeOutcome>)> = self
            .registry
            .iter()
            .map(|target| {
                let prober = self.prober.clone();
                let target = target.clone();
                let name = target.name.clone();
                (name, tokio::spawn(async move { prober.probe(&target).await }))
            })
            .collect();

        // 2. Join all of them before touching any state.
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (name, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(source) => {
                    tracing::error!("Probe task for {} did not complete: {}", name, source);
                    failure.get_or_insert(MonitorError::ProbeTask { target: name, source });
                }
            }
        }

        // 3. Aggregate, then escalate over the fully updated state. This runs
        // in its own task so stopping the loop cannot split a recorded
        // failure from its alert.
        let core = Arc::clone(self);
        tokio::spawn(async move {
            for outcome in &outcomes {
                core.incorporate(outcome).await;
            }
            core.check_critical_services().await;
        })
        .await
        .map_err(MonitorError::AggregationTask)?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn incorporate(&self, outcome: &ProbeOutcome) {
        let consecutive = self.tracker.record(outcome).await;
        let name = &outcome.target;

        match outcome.failure {
            None => {
                tracing::debug!("{} healthy - {:.3}s", name, outcome.latency.as_secs_f64());
                return;
            }
            Some(FailureReason::BadStatus(code)) => {
                tracing::warn!("{} unhealthy - HTTP {}", name, code);
                self.alerts
                    .add(AlertKind::ServerUnhealthy, format!("{} returned HTTP {}", name, code))
                    .await;
            }
            Some(reason) => {
                tracing::error!("{} check failed: {}", name, reason);
            }
        }

        // Equality: fires once per crossing, re-armed by the reset on success.
        if consecutive == self.failure_threshold {
            self.alerts
                .add(
                    AlertKind::ServerDown,
                    format!("{} has failed {} consecutive health checks", name, consecutive),
                )
                .await;
        }
    }

    async fn critical_services_down(&self) -> Vec<String> {
        let mut down = Vec::new();
        for target in self.registry.critical() {
            if !self.tracker.is_healthy(&target.name).await {
                down.push(target.name.clone());
            }
        }
        down
    }

    async fn check_critical_services(&self) {
        let down = self.critical_services_down().await;
        if !down.is_empty() {
            self.alerts
                .add(
                    AlertKind::CriticalServicesDown,
                    format!("Critical services down: {}", down.join(", ")),
                )
                .await;
        }
    }

    /// One loop iteration: the verdict, then a payment method refresh.
    async fn run_verification_cycle(&self) -> Result<(), MonitorError> {
        self.verify_contained().await?;

        // The verdict is already tallied, so a crash here is only logged.
        let verifier = self.verifier.clone();
        tokio::spawn(async move { verifier.check_payment_methods().await })
            .await
            .map_err(MonitorError::MethodRefreshTask)
    }

    /// Run one verdict in its own task, counting a crash as a failed cycle.
    async fn verify_contained(&self) -> Result<VerificationVerdict, MonitorError> {
        let verifier = self.verifier.clone();
        match tokio::spawn(async move { verifier.verify_cycle().await }).await {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                self.verifier.record_failed_cycle().await;
                self.alerts
                    .add(AlertKind::PaymentVerificationFailed, e.to_string())
                    .await;
                Err(MonitorError::VerificationTask(e))
            }
        }
    }
}

/// Handle to one running loop.
struct LoopHandle {
    stop: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Monitor loop ended abnormally: {}", e);
        }
    }
}

struct RunningLoops {
    server: LoopHandle,
    verification: LoopHandle,
}

/// The monitoring coordinator and its read-only query surface.
pub struct Monitor {
    core: Arc<MonitorCore>,
    server_cadence: Cadence,
    verification_cadence: Cadence,
    loops: Mutex<Option<RunningLoops>>,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        registry: Arc<TargetRegistry>,
        prober: Prober,
        alerts: Arc<AlertManager>,
        verifier: Arc<VerificationEngine>,
    ) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                registry,
                tracker: UptimeTracker::new(config.latency_window),
                alerts,
                verifier,
                prober,
                failure_threshold: config.failure_alert_threshold,
            }),
            server_cadence: Cadence {
                interval: config.server_check_interval,
                backoff: config.server_backoff,
            },
            verification_cadence: Cadence {
                interval: config.verification_interval,
                backoff: config.verification_backoff,
            },
            loops: Mutex::new(None),
        }
    }

    // --- Control surface ---

    /// Start both loops. Does nothing if they are already running.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            tracing::debug!("Monitor already running");
            return;
        }
        tracing::info!(
            "Starting monitor with {} targets",
            self.core.registry.len()
        );
        *loops = Some(self.spawn_loops());
    }

    /// Stop both loops. Accumulated statistics and alerts are kept.
    pub async fn stop(&self) {
        let running = self.loops.lock().await.take();
        if let Some(running) = running {
            running.server.shutdown().await;
            running.verification.shutdown().await;
        }
    }

    /// Stop the current loops and start fresh ones.
    pub async fn restart(&self) {
        tracing::info!("Restarting monitor");
        let mut loops = self.loops.lock().await;
        if let Some(running) = loops.take() {
            running.server.shutdown().await;
            running.verification.shutdown().await;
        }
        *loops = Some(self.spawn_loops());
    }

    pub async fn is_running(&self) -> bool {
        self.loops.lock().await.is_some()
    }

    /// Run one verification cycle now, independent of the loop timer.
    pub async fn trigger_verification_now(&self) -> Result<VerificationVerdict, MonitorError> {
        self.core.verify_contained().await
    }

    /// Run one server health cycle now.
    pub async fn run_server_cycle(&self) -> Result<(), MonitorError> {
        self.core.run_server_cycle().await
    }

    fn spawn_loops(&self) -> RunningLoops {
        let core = self.core.clone();
        let server = spawn_loop("server health", self.server_cadence, move || {
            let core = core.clone();
            async move { core.run_server_cycle().await }
        });

        let core = self.core.clone();
        let verification = spawn_loop("payment verification", self.verification_cadence, move || {
            let core = core.clone();
            async move { core.run_verification_cycle().await }
        });

        RunningLoops { server, verification }
    }

    // --- Query surface ---

    pub async fn get_all_status(&self) -> BTreeMap<String, bool> {
        self.core.tracker.status_all(&self.core.registry).await
    }

    pub async fn get_detailed_status(&self) -> BTreeMap<String, DetailedStatus> {
        self.core.tracker.snapshot_all(&self.core.registry).await
    }

    pub async fn get_uptime_percentage(&self, target: &str) -> f64 {
        self.core.tracker.get_uptime_percentage(target).await
    }

    pub async fn get_metrics(&self) -> ServerMetrics {
        let status = self.get_all_status().await;
        let recent = self.core.alerts.count_recent(METRICS_ALERT_WINDOW).await;
        ServerMetrics::new(&self.core.registry, status, recent)
    }

    /// Alerts within `window`, or within the configured retention if `None`.
    pub async fn get_alerts(&self, window: Option<Duration>) -> Vec<Alert> {
        match window {
            Some(window) => self.core.alerts.get_recent(window).await,
            None => self.core.alerts.get_alerts().await,
        }
    }

    pub async fn is_critical_service_down(&self) -> bool {
        !self.core.critical_services_down().await.is_empty()
    }

    pub async fn is_automation_active(&self) -> bool {
        self.core.verifier.is_active().await
    }

    pub async fn get_payment_stats(&self) -> VerificationStats {
        self.core.verifier.get_payment_stats().await
    }

    pub async fn get_payment_method_status(&self) -> BTreeMap<String, MethodStatus> {
        self.core.verifier.get_payment_method_status().await
    }

    pub async fn get_payment_metrics(&self) -> PaymentMetrics {
        self.core.verifier.get_metrics().await
    }

    pub async fn last_verdict(&self) -> Option<VerificationVerdict> {
        self.core.verifier.last_verdict().await
    }
}

/// Spawn a loop that runs `cycle` until stopped.
///
/// Stopping aborts the in-flight cycle task. Tasks it already spawned run to
/// completion; probe results not yet handed to aggregation are dropped.
fn spawn_loop<F, Fut>(name: &'static str, cadence: Cadence, cycle: F) -> LoopHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), MonitorError>> + Send + 'static,
{
    let (stop_tx, mut stop_rx) = broadcast::channel(1);

    let task = tokio::spawn(async move {
        tracing::info!("Starting {} loop", name);

        loop {
            let mut cycle_task = tokio::spawn(cycle());

            let delay = tokio::select! {
                _ = stop_rx.recv() => {
                    cycle_task.abort();
                    break;
                }
                joined = &mut cycle_task => match joined {
                    Ok(Ok(())) => cadence.interval,
                    Ok(Err(e)) => {
                        tracing::error!("Error in {} loop: {}", name, e);
                        cadence.backoff
                    }
                    Err(e) => {
                        tracing::error!("{} cycle crashed: {}", name, e);
                        cadence.backoff
                    }
                }
            };

            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Stopped {} loop", name);
    });

    LoopHandle { stop: stop_tx, task }
}
