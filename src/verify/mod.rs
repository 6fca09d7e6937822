//! Payment verification engine.
//!
//! Combines a gateway activity check, a ledger activity check and an
//! auxiliary reachability check into one verdict per cycle, and keeps a
//! lifetime tally of passing cycles.

mod gateway;
mod ledger;

pub use gateway::*;
pub use ledger::*;

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::alerts::{AlertKind, AlertManager};
use crate::probe::{FailureReason, Prober};
use crate::registry::Target;
use crate::tracker::round_to;

/// Verification error types.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("gateway request failed: {0}")]
    Gateway(String),
    #[error("gateway returned HTTP {0}")]
    GatewayStatus(u16),
    #[error("ledger unreadable: {0}")]
    Ledger(String),
    #[error("{0} unreachable: {1}")]
    Unreachable(String, FailureReason),
}

/// Result of one sub-check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    /// The check does not apply, e.g. the gateway has no credentials.
    NotApplicable,
    Errored(String),
}

impl CheckOutcome {
    fn counts_as_pass(&self) -> bool {
        matches!(self, CheckOutcome::Passed | CheckOutcome::NotApplicable)
    }
}

/// Composite verdict of a verification cycle.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationVerdict {
    pub gateway: CheckOutcome,
    pub ledger: CheckOutcome,
    pub auxiliary: CheckOutcome,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Lifetime verification tallies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationStats {
    pub automated_count: u64,
    pub failed_count: u64,
    pub total_processed: u64,
    pub last_verification: Option<DateTime<Utc>>,
}

impl VerificationStats {
    /// Fraction of passing cycles, `None` before the first cycle.
    pub fn success_ratio(&self) -> Option<f64> {
        if self.total_processed == 0 {
            return None;
        }
        Some(self.automated_count as f64 / self.total_processed as f64)
    }
}

/// Status of a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    Operational,
    Degraded,
    NotConfigured,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMetrics {
    pub payment_success_rate: f64,
    pub total_payments_processed: u64,
    pub failed_payments: u64,
    pub automation_active: bool,
    pub last_verification: Option<DateTime<Utc>>,
    pub payment_methods: BTreeMap<String, MethodStatus>,
}

/// Runs verification cycles and owns [`VerificationStats`].
pub struct VerificationEngine {
    prober: Prober,
    ledger: Arc<dyn Ledger>,
    alerts: Arc<AlertManager>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    auxiliary: Option<Target>,
    wallet_service: Option<Target>,
    probe_timeout: Duration,
    automation_threshold: f64,
    stats: RwLock<VerificationStats>,
    methods: RwLock<BTreeMap<String, MethodStatus>>,
    last_verdict: RwLock<Option<VerificationVerdict>>,
}

impl VerificationEngine {
    pub fn new(prober: Prober, ledger: Arc<dyn Ledger>, alerts: Arc<AlertManager>) -> Self {
        Self {
            prober,
            ledger,
            alerts,
            gateway: None,
            auxiliary: None,
            wallet_service: None,
            probe_timeout: Duration::from_secs(5),
            automation_threshold: 0.8,
            stats: RwLock::new(VerificationStats::default()),
            methods: RwLock::new(BTreeMap::new()),
            last_verdict: RwLock::new(None),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_auxiliary(mut self, target: Target) -> Self {
        self.auxiliary = Some(target);
        self
    }

    pub fn with_wallet_service(mut self, target: Target) -> Self {
        self.wallet_service = Some(target);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_automation_threshold(mut self, threshold: f64) -> Self {
        self.automation_threshold = threshold;
        self
    }

    pub fn gateway_configured(&self) -> bool {
        self.gateway.is_some()
    }

    /// Run every sub-check, record the verdict and return it.
    pub async fn verify_cycle(&self) -> VerificationVerdict {
        tracing::info!("Starting payment verification cycle");

        // Each check is guarded on its own; an error or panic in one never
        // skips the others.
        let gateway = contained("gateway", self.check_gateway())
            .await
            .unwrap_or_else(CheckOutcome::Errored);
        let ledger = contained("ledger", self.check_ledger())
            .await
            .unwrap_or_else(CheckOutcome::Errored);
        let auxiliary = contained("auxiliary", self.check_auxiliary())
            .await
            .unwrap_or_else(CheckOutcome::Errored);

        for (kind, outcome) in [
            (AlertKind::GatewayCheckFailed, &gateway),
            (AlertKind::LedgerCheckFailed, &ledger),
            (AlertKind::AuxiliaryCheckFailed, &auxiliary),
        ] {
            if let CheckOutcome::Errored(message) = outcome {
                self.alerts.add(kind, message.clone()).await;
            }
        }

        let passed = gateway.counts_as_pass() && ledger.counts_as_pass() && auxiliary.counts_as_pass();
        let timestamp = Utc::now();

        {
            let mut stats = self.stats.write().await;
            stats.total_processed += 1;
            if passed {
                stats.automated_count += 1;
            } else {
                stats.failed_count += 1;
            }
            stats.last_verification = Some(timestamp);
        }

        let verdict = VerificationVerdict {
            gateway,
            ledger,
            auxiliary,
            passed,
            timestamp,
        };
        *self.last_verdict.write().await = Some(verdict.clone());

        tracing::info!("Payment verification cycle completed (passed: {})", passed);
        verdict
    }

    /// Count a cycle that died before producing a verdict.
    pub async fn record_failed_cycle(&self) {
        let mut stats = self.stats.write().await;
        stats.total_processed += 1;
        stats.failed_count += 1;
        stats.last_verification = Some(Utc::now());
    }

    async fn check_gateway(&self) -> CheckOutcome {
        let Some(gateway) = &self.gateway else {
            return CheckOutcome::NotApplicable;
        };

        match gateway.recent_charges(Utc::now() - ChronoDuration::hours(1)).await {
            Ok(0) => {
                tracing::warn!("No recent gateway charges found");
                CheckOutcome::Failed
            }
            Ok(count) => {
                tracing::info!("Found {} recent gateway charges", count);
                CheckOutcome::Passed
            }
            Err(e) => {
                tracing::error!("Gateway verification failed: {}", e);
                CheckOutcome::Errored(e.to_string())
            }
        }
    }

    async fn check_ledger(&self) -> CheckOutcome {
        match self.ledger.entry_count().await {
            Ok(Some(0)) => {
                tracing::warn!("Ledger has no entries");
                CheckOutcome::Failed
            }
            Ok(Some(_)) => CheckOutcome::Passed,
            Ok(None) => {
                tracing::warn!("Ledger not found");
                CheckOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Ledger verification failed: {}", e);
                CheckOutcome::Errored(e.to_string())
            }
        }
    }

    async fn check_auxiliary(&self) -> CheckOutcome {
        let Some(target) = &self.auxiliary else {
            return CheckOutcome::NotApplicable;
        };

        let outcome = self
            .prober
            .probe_endpoint(&target.name, &target.endpoint, self.probe_timeout)
            .await;

        match outcome.failure {
            None => CheckOutcome::Passed,
            // Reachable counts as verified even when the reply is not 200.
            Some(FailureReason::BadStatus(code)) => {
                tracing::warn!("Auxiliary service {} returned HTTP {}", target.name, code);
                CheckOutcome::Passed
            }
            Some(reason) => {
                let err = VerifyError::Unreachable(target.name.clone(), reason);
                tracing::error!("Auxiliary verification failed: {}", err);
                CheckOutcome::Errored(err.to_string())
            }
        }
    }

    /// Refresh the per-method status map.
    pub async fn check_payment_methods(&self) {
        let gateway = match &self.gateway {
            None => MethodStatus::NotConfigured,
            Some(gateway) => match contained("gateway status", gateway.check_balance()).await {
                Ok(Ok(())) => MethodStatus::Operational,
                Ok(Err(e)) => {
                    tracing::error!("Gateway status check failed: {}", e);
                    MethodStatus::Error
                }
                Err(_) => MethodStatus::Error,
            },
        };

        let ledger = if self.endpoint_healthy(self.wallet_service.as_ref()).await
            || matches!(contained("ledger status", self.ledger.entry_count()).await, Ok(Ok(Some(_))))
        {
            MethodStatus::Operational
        } else {
            MethodStatus::Degraded
        };

        let auxiliary = match &self.auxiliary {
            None => MethodStatus::NotConfigured,
            Some(target) if self.endpoint_healthy(Some(target)).await => MethodStatus::Operational,
            Some(_) => MethodStatus::Error,
        };

        let mut methods = self.methods.write().await;
        methods.insert("gateway".to_string(), gateway);
        methods.insert("ledger".to_string(), ledger);
        methods.insert("auxiliary".to_string(), auxiliary);
    }

    async fn endpoint_healthy(&self, target: Option<&Target>) -> bool {
        match target {
            Some(t) => contained(
                &t.name,
                self.prober.probe_endpoint(&t.name, &t.endpoint, self.probe_timeout),
            )
            .await
            .is_ok_and(|outcome| outcome.healthy),
            None => false,
        }
    }

    /// True iff the lifetime pass ratio strictly exceeds the threshold.
    pub async fn is_active(&self) -> bool {
        self.stats
            .read()
            .await
            .success_ratio()
            .is_some_and(|ratio| ratio > self.automation_threshold)
    }

    pub async fn get_payment_stats(&self) -> VerificationStats {
        self.stats.read().await.clone()
    }

    pub async fn get_payment_method_status(&self) -> BTreeMap<String, MethodStatus> {
        self.methods.read().await.clone()
    }

    pub async fn last_verdict(&self) -> Option<VerificationVerdict> {
        self.last_verdict.read().await.clone()
    }

    pub async fn get_metrics(&self) -> PaymentMetrics {
        let stats = self.get_payment_stats().await;
        PaymentMetrics {
            payment_success_rate: round_to(stats.success_ratio().unwrap_or(0.0) * 100.0, 2),
            total_payments_processed: stats.total_processed,
            failed_payments: stats.failed_count,
            automation_active: self.is_active().await,
            last_verification: stats.last_verification,
            payment_methods: self.get_payment_method_status().await,
        }
    }
}

/// Await `check`, turning a panic into an error message.
async fn contained<F: Future>(label: &str, check: F) -> Result<F::Output, String> {
    AssertUnwindSafe(check).catch_unwind().await.map_err(|panic| {
        let message = format!("{} check panicked: {}", label, panic_message(&*panic));
        tracing::error!("{}", message);
        message
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::alerts::Severity;
    use crate::probe::testing::{Behavior, ScriptedSource};
    use crate::registry::Tier;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn engine_with(
        source: ScriptedSource,
        ledger: impl Ledger + 'static,
    ) -> (VerificationEngine, Arc<AlertManager>) {
        let alerts = Arc::new(AlertManager::new(100, DAY));
        let prober = Prober::new(Arc::new(source), Duration::from_secs(10));
        let engine = VerificationEngine::new(prober, Arc::new(ledger), alerts.clone());
        (engine, alerts)
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_is_excluded() {
        let (engine, alerts) = engine_with(ScriptedSource::default(), FakeLedger::entries(3));

        let verdict = engine.verify_cycle().await;

        assert_eq!(verdict.gateway, CheckOutcome::NotApplicable);
        assert_eq!(verdict.auxiliary, CheckOutcome::NotApplicable);
        assert!(verdict.passed);
        assert!(!engine.gateway_configured());
        assert_eq!(alerts.len().await, 0);

        let stats = engine.get_payment_stats().await;
        assert_eq!(stats.automated_count, 1);
        assert_eq!(stats.total_processed, 1);
        assert!(stats.last_verification.is_some());
    }

    #[tokio::test]
    async fn test_gateway_without_activity_fails_cycle() {
        let (engine, _alerts) = engine_with(ScriptedSource::default(), FakeLedger::entries(3));
        let engine = engine.with_gateway(Arc::new(FakeGateway::with_charges(0)));

        let verdict = engine.verify_cycle().await;
        assert_eq!(verdict.gateway, CheckOutcome::Failed);
        assert!(!verdict.passed);
        assert_eq!(engine.get_payment_stats().await.failed_count, 1);
    }

    #[tokio::test]
    async fn test_errored_check_does_not_skip_siblings() {
        let source = ScriptedSource::new(&[("http://dex", Behavior::Status(200))]);
        let (engine, alerts) = engine_with(source, FakeLedger::entries(1));
        let engine = engine
            .with_gateway(Arc::new(FakeGateway::failing("api key revoked")))
            .with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard));

        let verdict = engine.verify_cycle().await;

        assert!(matches!(verdict.gateway, CheckOutcome::Errored(_)));
        assert_eq!(verdict.ledger, CheckOutcome::Passed);
        assert_eq!(verdict.auxiliary, CheckOutcome::Passed);
        assert!(!verdict.passed);

        let raised = alerts.get_alerts().await;
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, AlertKind::GatewayCheckFailed);
        assert_eq!(raised[0].severity, Severity::High);
        assert!(raised[0].message.contains("api key revoked"));

        let stats = engine.get_payment_stats().await;
        assert_eq!((stats.automated_count, stats.failed_count, stats.total_processed), (0, 1, 1));
    }

    #[tokio::test]
    async fn test_ledger_outcomes() {
        let (engine, alerts) = engine_with(ScriptedSource::default(), FakeLedger::missing());
        assert_eq!(engine.verify_cycle().await.ledger, CheckOutcome::Failed);
        assert_eq!(alerts.len().await, 0);

        let (engine, alerts) = engine_with(ScriptedSource::default(), FakeLedger::corrupt());
        assert!(matches!(engine.verify_cycle().await.ledger, CheckOutcome::Errored(_)));
        assert_eq!(alerts.get_alerts().await[0].kind, AlertKind::LedgerCheckFailed);
    }

    #[tokio::test]
    async fn test_auxiliary_outcomes() {
        let source = ScriptedSource::new(&[("http://dex", Behavior::Status(500))]);
        let (engine, alerts) = engine_with(source, FakeLedger::entries(1));
        let engine = engine.with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard));
        let verdict = engine.verify_cycle().await;
        assert_eq!(verdict.auxiliary, CheckOutcome::Passed);
        assert!(verdict.passed);
        assert_eq!(alerts.len().await, 0);

        let source = ScriptedSource::new(&[("http://dex", Behavior::Refuse)]);
        let (engine, alerts) = engine_with(source, FakeLedger::entries(1));
        let engine = engine.with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard));
        assert!(matches!(engine.verify_cycle().await.auxiliary, CheckOutcome::Errored(_)));
        assert_eq!(alerts.get_alerts().await[0].kind, AlertKind::AuxiliaryCheckFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auxiliary_uses_payment_timeout() {
        let source = ScriptedSource::new(&[("http://dex", Behavior::Hang)]);
        let (engine, _alerts) = engine_with(source, FakeLedger::entries(1));
        let engine = engine
            .with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard))
            .with_probe_timeout(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        let verdict = engine.verify_cycle().await;
        assert!(matches!(verdict.auxiliary, CheckOutcome::Errored(_)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_is_active_thresholds() {
        let (engine, _alerts) = engine_with(ScriptedSource::default(), FakeLedger::entries(1));
        assert!(!engine.is_active().await);

        {
            let mut stats = engine.stats.write().await;
            stats.total_processed = 100;
            stats.automated_count = 81;
            stats.failed_count = 19;
        }
        assert!(engine.is_active().await);

        {
            let mut stats = engine.stats.write().await;
            stats.automated_count = 79;
            stats.failed_count = 21;
        }
        assert!(!engine.is_active().await);

        {
            let mut stats = engine.stats.write().await;
            stats.automated_count = 80;
            stats.failed_count = 20;
        }
        assert!(!engine.is_active().await, "threshold is strict");
    }

    #[tokio::test]
    async fn test_payment_method_status() {
        let source = ScriptedSource::new(&[
            ("http://wallet", Behavior::Status(503)),
            ("http://dex", Behavior::Status(200)),
        ]);
        let (engine, _alerts) = engine_with(source, FakeLedger::missing());
        let engine = engine
            .with_wallet_service(Target::new("wallet_service", "http://wallet", Tier::Standard))
            .with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard));

        engine.check_payment_methods().await;
        let methods = engine.get_payment_method_status().await;

        assert_eq!(methods["gateway"], MethodStatus::NotConfigured);
        assert_eq!(methods["ledger"], MethodStatus::Degraded);
        assert_eq!(methods["auxiliary"], MethodStatus::Operational);
    }

    #[tokio::test]
    async fn test_metrics_after_cycles() {
        let (engine, _alerts) = engine_with(ScriptedSource::default(), FakeLedger::entries(2));
        let engine = engine.with_gateway(Arc::new(FakeGateway::with_charges(4)));

        for _ in 0..2 {
            engine.verify_cycle().await;
            engine.check_payment_methods().await;
        }

        let metrics = engine.get_metrics().await;
        assert_eq!(metrics.payment_success_rate, 100.0);
        assert_eq!(metrics.total_payments_processed, 2);
        assert!(metrics.automation_active);
        assert_eq!(metrics.payment_methods["gateway"], MethodStatus::Operational);
        assert!(engine.last_verdict().await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_panicking_ledger_does_not_skip_siblings() {
        let source = ScriptedSource::new(&[("http://dex", Behavior::Status(200))]);
        let (engine, alerts) = engine_with(source, PanickingLedger::default());
        let engine = engine.with_auxiliary(Target::new("dex_connector", "http://dex", Tier::Standard));

        let verdict = engine.verify_cycle().await;
        assert_eq!(verdict.auxiliary, CheckOutcome::Passed);
        assert!(matches!(verdict.ledger, CheckOutcome::Errored(ref m) if m.contains("ledger backend crashed")));
        assert!(!verdict.passed);

        let stats = engine.get_payment_stats().await;
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(alerts.get_alerts().await[0].kind, AlertKind::LedgerCheckFailed);
    }

    #[tokio::test]
    async fn test_method_refresh_survives_panicking_ledger() {
        let (engine, _alerts) = engine_with(ScriptedSource::default(), PanickingLedger::after(1));

        assert!(engine.verify_cycle().await.passed);
        engine.check_payment_methods().await;

        let stats = engine.get_payment_stats().await;
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.automated_count, 1);
        assert_eq!(stats.failed_count, 0);
        assert_eq!(engine.get_payment_method_status().await["ledger"], MethodStatus::Degraded);
    }
}
