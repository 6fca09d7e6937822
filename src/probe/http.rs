//! HTTP status source.

use std::time::Duration;

use async_trait::async_trait;

use super::{ProbeError, StatusSource};

/// Fetches status codes with a shared HTTP client.
#[derive(Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
}

impl HttpStatusSource {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Prefix bare host names with `http://`.
pub fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_status(&self, endpoint: &str, timeout: Duration) -> Result<u16, ProbeError> {
        let url = normalize_url(endpoint);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else if e.is_builder() {
                    ProbeError::Config(e.to_string())
                } else {
                    ProbeError::Connection(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{FailureReason, Prober};
    use crate::registry::{Target, Tier};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_prober(timeout: Duration) -> Prober {
        Prober::new(Arc::new(HttpStatusSource::new().unwrap()), timeout)
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("localhost:8001/health"), "http://localhost:8001/health");
        assert_eq!(normalize_url("https://api.stripe.com"), "https://api.stripe.com");
    }

    #[tokio::test]
    async fn test_http_probe_healthy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let target = Target::new("svc", &format!("{}/health", mock_server.uri()), Tier::Standard);
        let outcome = http_prober(Duration::from_secs(5)).probe(&target).await;

        assert!(outcome.healthy);
        assert_eq!(outcome.failure, None);
    }

    #[tokio::test]
    async fn test_http_probe_bad_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let target = Target::new("svc", &mock_server.uri(), Tier::Standard);
        let outcome = http_prober(Duration::from_secs(5)).probe(&target).await;

        assert!(!outcome.healthy);
        assert_eq!(outcome.failure, Some(FailureReason::BadStatus(503)));
    }

    #[tokio::test]
    async fn test_http_probe_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let target = Target::new("svc", &mock_server.uri(), Tier::Standard);
        let outcome = http_prober(Duration::from_millis(200)).probe(&target).await;

        assert_eq!(outcome.failure, Some(FailureReason::Timeout));
        assert!(outcome.latency < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = Target::new("svc", &format!("127.0.0.1:{}", port), Tier::Standard);
        let outcome = http_prober(Duration::from_secs(2)).probe(&target).await;

        assert_eq!(outcome.failure, Some(FailureReason::ConnectionError));
    }
}
