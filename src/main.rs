//! paywatch - payment infrastructure monitor
//!
//! Probes a fixed set of HTTP targets, tracks their uptime, verifies the
//! payment pipeline on a separate cadence and serves the results over a
//! small JSON API.

mod alerts;
mod config;
mod monitor;
mod probe;
mod registry;
mod tracker;
mod verify;
mod web;

use alerts::AlertManager;
use config::{MonitorConfig, ServerConfig};
use monitor::Monitor;
use probe::{HttpStatusSource, Prober};
use registry::TargetRegistry;
use verify::{FileLedger, StripeGateway, VerificationEngine};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("paywatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    let monitor_cfg = MonitorConfig::load()?;
    tracing::info!("Starting paywatch on port {}...", cfg.http_port);

    let registry = Arc::new(TargetRegistry::new(monitor_cfg.build_targets())?);
    if registry.is_empty() {
        tracing::warn!("No targets configured, only payment verification will run");
    }
    for target in registry.iter() {
        tracing::info!("Monitoring {} at {} ({:?})", target.name, target.endpoint, target.tier);
    }

    let prober = Prober::new(Arc::new(HttpStatusSource::new()?), monitor_cfg.probe_timeout);
    let alerts = Arc::new(AlertManager::new(
        monitor_cfg.alert_capacity,
        monitor_cfg.alert_retention,
    ));

    // Verification engine
    let ledger = Arc::new(FileLedger::new(&monitor_cfg.ledger_path));
    let mut verifier = VerificationEngine::new(prober.clone(), ledger, alerts.clone())
        .with_probe_timeout(monitor_cfg.payment_probe_timeout)
        .with_automation_threshold(monitor_cfg.automation_threshold);

    if let Some(key) = &monitor_cfg.stripe_secret_key {
        let gateway = StripeGateway::new(key, monitor_cfg.payment_probe_timeout)?;
        verifier = verifier.with_gateway(Arc::new(gateway));
    }
    if !verifier.gateway_configured() {
        tracing::warn!("STRIPE_SECRET_KEY not set, gateway checks disabled");
    }
    if let Some(target) = registry.get(&monitor_cfg.auxiliary_target) {
        verifier = verifier.with_auxiliary(target.clone());
    }
    if let Some(target) = registry.get(&monitor_cfg.wallet_target) {
        verifier = verifier.with_wallet_service(target.clone());
    }

    // Start monitoring loops
    let monitor = Arc::new(Monitor::new(
        &monitor_cfg,
        registry,
        prober,
        alerts,
        Arc::new(verifier),
    ));
    monitor.start().await;

    // Start web server
    let server = Server::new(cfg, monitor);
    server.start().await?;

    Ok(())
}
