//! Payment gateway capability.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::VerifyError;

/// Read-only view of a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Number of charges created at or after `since`.
    async fn recent_charges(&self, since: DateTime<Utc>) -> Result<usize, VerifyError>;

    /// Succeeds if the gateway API answers an authenticated request.
    async fn check_balance(&self) -> Result<(), VerifyError>;
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Vec<Charge>,
}

#[derive(Debug, Deserialize)]
struct Charge {
    /// Unix seconds.
    created: i64,
}

/// Stripe REST API client.
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    timeout: Duration,
}

impl StripeGateway {
    pub fn new(secret_key: &str, timeout: Duration) -> Result<Self, VerifyError> {
        Self::with_base_url("https://api.stripe.com", secret_key, timeout)
    }

    pub fn with_base_url(base_url: &str, secret_key: &str, timeout: Duration) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| VerifyError::Gateway(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            timeout,
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, VerifyError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VerifyError::Gateway(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::GatewayStatus(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn recent_charges(&self, since: DateTime<Utc>) -> Result<usize, VerifyError> {
        let charges: ChargeList = self
            .get("/v1/charges?limit=10")
            .await?
            .json()
            .await
            .map_err(|e| VerifyError::Gateway(format!("invalid charge list: {}", e)))?;

        let cutoff = since.timestamp();
        Ok(charges.data.iter().filter(|c| c.created >= cutoff).count())
    }

    async fn check_balance(&self) -> Result<(), VerifyError> {
        self.get("/v1/balance").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_recent_charges_counts_window() {
        let mock_server = MockServer::start().await;
        let now = Utc::now();

        Mock::given(method("GET"))
            .and(path("/v1/charges"))
            .and(query_param("limit", "10"))
            .and(header("Authorization", "Bearer sk_test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    { "id": "ch_1", "created": (now - ChronoDuration::minutes(5)).timestamp() },
                    { "id": "ch_2", "created": (now - ChronoDuration::minutes(30)).timestamp() },
                    { "id": "ch_3", "created": (now - ChronoDuration::hours(3)).timestamp() },
                ]
            })))
            .mount(&mock_server)
            .await;

        let gateway =
            StripeGateway::with_base_url(&mock_server.uri(), "sk_test_key", Duration::from_secs(5)).unwrap();
        let count = gateway.recent_charges(now - ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_rejected_key_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/balance"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let gateway =
            StripeGateway::with_base_url(&mock_server.uri(), "sk_bad", Duration::from_secs(5)).unwrap();
        let err = gateway.check_balance().await.unwrap_err();
        assert!(matches!(err, VerifyError::GatewayStatus(401)));
    }
}
