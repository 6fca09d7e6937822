//! Probe module for health checks.
//!
//! A probe never fails: transport errors and timeouts are classified into a
//! [`ProbeOutcome`] for the tracker and alert manager to consume.

mod http;

pub use http::*;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::registry::Target;

/// Probe error types, internal to the transport boundary.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a probe was classified unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    ConnectionError,
    BadStatus(u16),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::ConnectionError => write!(f, "connection_error"),
            FailureReason::BadStatus(code) => write!(f, "bad_status({})", code),
        }
    }
}

/// The classified result of one probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub healthy: bool,
    pub latency: Duration,
    /// `None` when healthy.
    pub failure: Option<FailureReason>,
}

/// Transport that fetches a status code from an endpoint.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, endpoint: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// Runs bounded health checks through a [`StatusSource`].
#[derive(Clone)]
pub struct Prober {
    source: Arc<dyn StatusSource>,
    timeout: Duration,
}

impl Prober {
    pub fn new(source: Arc<dyn StatusSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Probe a target with the default timeout.
    pub async fn probe(&self, target: &Target) -> ProbeOutcome {
        self.probe_endpoint(&target.name, &target.endpoint, self.timeout).await
    }

    /// Probe an endpoint, never waiting longer than `timeout`.
    ///
    /// The deadline is enforced here regardless of what the source does.
    pub async fn probe_endpoint(&self, name: &str, endpoint: &str, timeout: Duration) -> ProbeOutcome {
        let timestamp = Utc::now();
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, self.source.fetch_status(endpoint, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };
        let latency = start.elapsed();

        let failure = match result {
            Ok(200) => None,
            Ok(code) => Some(FailureReason::BadStatus(code)),
            Err(ProbeError::Timeout(_)) => Some(FailureReason::Timeout),
            Err(e) => {
                tracing::debug!("Probe transport error for {}: {}", name, e);
                Some(FailureReason::ConnectionError)
            }
        };

        ProbeOutcome {
            target: name.to_string(),
            timestamp,
            healthy: failure.is_none(),
            latency,
            failure,
        }
    }
}
