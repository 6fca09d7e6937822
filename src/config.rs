//! Configuration module for paywatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::registry::{Target, Tier};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed target entry '{0}', expected name=url")]
    MalformedTarget(String),
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the status API (default: 8000)
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { http_port: 8000 }
    }
}

/// Monitor configuration: targets, cadences, thresholds and retention.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Target name to endpoint URL, in registration order.
    pub targets: Vec<(String, String)>,
    /// Names of targets in the critical tier.
    pub critical_targets: Vec<String>,
    pub server_check_interval: Duration,
    pub verification_interval: Duration,
    pub probe_timeout: Duration,
    /// Timeout for probes issued by the verification engine.
    pub payment_probe_timeout: Duration,
    pub failure_alert_threshold: u32,
    pub automation_threshold: f64,
    pub alert_retention: Duration,
    pub alert_capacity: usize,
    pub latency_window: usize,
    /// Backoff after a failed server cycle.
    pub server_backoff: Duration,
    /// Backoff after a failed verification cycle.
    pub verification_backoff: Duration,
    pub ledger_path: String,
    pub auxiliary_target: String,
    pub wallet_target: String,
    pub stripe_secret_key: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                ("stripe_api".to_string(), "https://api.stripe.com/v1/charges".to_string()),
                ("payment_processor".to_string(), "http://localhost:8001/health".to_string()),
                ("wallet_service".to_string(), "http://localhost:8002/health".to_string()),
                ("dex_connector".to_string(), "http://localhost:8003/health".to_string()),
            ],
            critical_targets: vec!["stripe_api".to_string(), "payment_processor".to_string()],
            server_check_interval: Duration::from_secs(15),
            verification_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(10),
            payment_probe_timeout: Duration::from_secs(5),
            failure_alert_threshold: 3,
            automation_threshold: 0.8,
            alert_retention: Duration::from_secs(24 * 3600),
            alert_capacity: 100,
            latency_window: 50,
            server_backoff: Duration::from_secs(5),
            verification_backoff: Duration::from_secs(10),
            ledger_path: "wallets.json".to_string(),
            auxiliary_target: "dex_connector".to_string(),
            wallet_target: "wallet_service".to_string(),
            stripe_secret_key: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAYWATCH_HTTP_PORT`: HTTP port (default: 8000)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("PAYWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        cfg
    }
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparseable numeric values keep their defaults. A malformed target
    /// map is an error.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("PAYWATCH_TARGETS") {
            cfg.targets = parse_targets(&raw)?;
        }
        if let Some(raw) = lookup("PAYWATCH_CRITICAL_TARGETS") {
            cfg.critical_targets = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        let secs = |key: &str, current: Duration| -> Duration {
            lookup(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(current)
        };
        cfg.server_check_interval = secs("PAYWATCH_SERVER_CHECK_INTERVAL_SECS", cfg.server_check_interval);
        cfg.verification_interval = secs("PAYWATCH_VERIFICATION_INTERVAL_SECS", cfg.verification_interval);
        cfg.probe_timeout = secs("PAYWATCH_PROBE_TIMEOUT_SECS", cfg.probe_timeout);
        cfg.payment_probe_timeout = secs("PAYWATCH_PAYMENT_PROBE_TIMEOUT_SECS", cfg.payment_probe_timeout);

        if let Some(hours) = lookup("PAYWATCH_ALERT_RETENTION_HOURS").and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.alert_retention = Duration::from_secs(hours * 3600);
        }
        if let Some(v) = lookup("PAYWATCH_FAILURE_ALERT_THRESHOLD").and_then(|s| s.trim().parse().ok()) {
            cfg.failure_alert_threshold = v;
        }
        if let Some(v) = lookup("PAYWATCH_AUTOMATION_THRESHOLD").and_then(|s| s.trim().parse().ok()) {
            cfg.automation_threshold = v;
        }
        if let Some(v) = lookup("PAYWATCH_ALERT_CAPACITY").and_then(|s| s.trim().parse().ok()) {
            cfg.alert_capacity = v;
        }
        if let Some(v) = lookup("PAYWATCH_LATENCY_WINDOW").and_then(|s| s.trim().parse().ok()) {
            cfg.latency_window = v;
        }
        if let Some(path) = lookup("PAYWATCH_LEDGER_PATH") {
            cfg.ledger_path = path;
        }
        if let Some(name) = lookup("PAYWATCH_AUXILIARY_TARGET") {
            cfg.auxiliary_target = name;
        }
        if let Some(name) = lookup("PAYWATCH_WALLET_TARGET") {
            cfg.wallet_target = name;
        }
        cfg.stripe_secret_key = lookup("STRIPE_SECRET_KEY").filter(|k| !k.trim().is_empty());

        Ok(cfg)
    }

    /// Build registry entries, tagging configured critical names.
    pub fn build_targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .map(|(name, endpoint)| {
                let tier = if self.critical_targets.iter().any(|c| c == name) {
                    Tier::Critical
                } else {
                    Tier::Standard
                };
                Target::new(name, endpoint, tier)
            })
            .collect()
    }
}

/// Parse `name=url;name=url` into ordered pairs.
fn parse_targets(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Ok((name.trim().to_string(), url.trim().to_string()))
            }
            _ => Err(ConfigError::MalformedTarget(entry.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8000);

        let monitor = MonitorConfig::default();
        assert_eq!(monitor.server_check_interval, Duration::from_secs(15));
        assert_eq!(monitor.verification_interval, Duration::from_secs(60));
        assert_eq!(monitor.probe_timeout, Duration::from_secs(10));
        assert_eq!(monitor.payment_probe_timeout, Duration::from_secs(5));
        assert_eq!(monitor.failure_alert_threshold, 3);
        assert_eq!(monitor.alert_capacity, 100);
        assert_eq!(monitor.latency_window, 50);
        assert_eq!(monitor.targets.len(), 4);
        assert!(monitor.stripe_secret_key.is_none());
    }

    #[test]
    fn test_load_overrides() {
        let cfg = MonitorConfig::load_from(lookup_from(&[
            ("PAYWATCH_TARGETS", "svc_a=http://a/health; svc_b=http://b/health"),
            ("PAYWATCH_CRITICAL_TARGETS", "svc_b"),
            ("PAYWATCH_SERVER_CHECK_INTERVAL_SECS", "0"),
            ("PAYWATCH_PROBE_TIMEOUT_SECS", "2.5"),
            ("PAYWATCH_ALERT_RETENTION_HOURS", "48"),
            ("PAYWATCH_LATENCY_WINDOW", "not-a-number"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
        ]))
        .unwrap();

        assert_eq!(
            cfg.targets,
            vec![
                ("svc_a".to_string(), "http://a/health".to_string()),
                ("svc_b".to_string(), "http://b/health".to_string()),
            ]
        );
        assert_eq!(cfg.server_check_interval, Duration::ZERO);
        assert_eq!(cfg.probe_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.alert_retention, Duration::from_secs(48 * 3600));
        assert_eq!(cfg.latency_window, 50);
        assert_eq!(cfg.stripe_secret_key.as_deref(), Some("sk_test_123"));

        let targets = cfg.build_targets();
        assert_eq!(targets[0].tier, Tier::Standard);
        assert_eq!(targets[1].tier, Tier::Critical);
    }

    #[test]
    fn test_blank_stripe_key_is_not_configured() {
        let cfg = MonitorConfig::load_from(lookup_from(&[("STRIPE_SECRET_KEY", "  ")])).unwrap();
        assert!(cfg.stripe_secret_key.is_none());
    }

    #[test]
    fn test_malformed_target_rejected() {
        let err = MonitorConfig::load_from(lookup_from(&[("PAYWATCH_TARGETS", "svc_a")])).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedTarget(_)));
    }
}
