//! Alert model types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Alert categories raised by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A target answered with a non-200 status.
    ServerUnhealthy,
    /// A target crossed the consecutive-failure threshold.
    ServerDown,
    /// One or more critical targets are unhealthy after a cycle.
    CriticalServicesDown,
    PaymentVerificationFailed,
    GatewayCheckFailed,
    LedgerCheckFailed,
    AuxiliaryCheckFailed,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ServerUnhealthy => "server_unhealthy",
            AlertKind::ServerDown => "server_down",
            AlertKind::CriticalServicesDown => "critical_services_down",
            AlertKind::PaymentVerificationFailed => "payment_verification_failed",
            AlertKind::GatewayCheckFailed => "gateway_check_failed",
            AlertKind::LedgerCheckFailed => "ledger_check_failed",
            AlertKind::AuxiliaryCheckFailed => "auxiliary_check_failed",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity from keywords in the alert tag.
    ///
    /// NOTE: keyword matching on the tag is fragile; a new tag containing
    /// "down" or "failed" changes severity implicitly.
    pub fn classify(tag: &str) -> Self {
        if tag.contains("critical") || tag.contains("down") {
            Severity::Critical
        } else if tag.contains("failed") {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// An immutable alert record.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            severity: Severity::classify(kind.as_str()),
            timestamp,
        }
    }
}
