//! HTTP client for the sitepulse ingestion endpoint
//!
//! Implements [`Transport`] for batch delivery and exposes the read path
//! (`GET /api/analytics`) used by the CLI.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::types::{AnalyticsSummary, Batch, StoredBatch};

use super::transport::{Transport, MAX_BEACON_BYTES};

/// Path of the ingestion endpoint
pub const ANALYTICS_PATH: &str = "/api/analytics";

/// HTTP transport for the ingestion endpoint
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport from collector configuration
    ///
    /// Returns an error if `server_url` is missing.
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let server_url = config
            .server_url
            .as_deref()
            .ok_or_else(|| Error::Config("collector.server_url is required".to_string()))?;

        Self::with_base_url(server_url, Duration::from_secs(config.timeout_secs))
    }

    /// Create a transport for an explicit base URL
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn analytics_url(&self) -> String {
        format!("{}{}", self.base_url, ANALYTICS_PATH)
    }

    /// Fetch aggregate counters
    pub async fn summary(&self) -> Result<AnalyticsSummary> {
        let response = self
            .http_client
            .get(self.analytics_url())
            .send()
            .await
            .map_err(|e| Error::Collector(format!("HTTP request failed: {}", e)))?;

        parse_json_response(response).await
    }

    /// Fetch every stored batch that contains an event of `session_id`
    pub async fn session_batches(&self, session_id: &str) -> Result<Vec<StoredBatch>> {
        let url = format!(
            "{}?sessionId={}",
            self.analytics_url(),
            urlencoding::encode(session_id)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Collector(format!("HTTP request failed: {}", e)))?;

        parse_json_response(response).await
    }

    /// Check if the ingestion server is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Result<()> {
        let response = self
            .http_client
            .post(self.analytics_url())
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::Collector(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::Collector(format!(
            "API error ({}): {}",
            status, error_text
        )))
    }

    fn send_beacon(&self, batch: Batch) -> bool {
        let body = match serde_json::to_vec(&batch) {
            Ok(body) if body.len() <= MAX_BEACON_BYTES => body,
            Ok(body) => {
                tracing::warn!(bytes = body.len(), "Beacon payload too large, not sent");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode beacon payload");
                return false;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let request = self.http_client.post(self.analytics_url()).body(body);
        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(error = %e, "Beacon delivery failed");
            }
        });
        true
    }
}

async fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| Error::Collector(format!("failed to parse response: {}", e)))
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::Collector(format!(
            "API error ({}): {}",
            status, error_text
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientContext;

    #[test]
    fn test_transport_requires_server_url() {
        let config = CollectorConfig::default();
        assert!(HttpTransport::new(&config).is_err());
    }

    #[test]
    fn test_transport_trims_trailing_slash() {
        let config = CollectorConfig {
            server_url: Some("https://example.com/".to_string()),
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.analytics_url(), "https://example.com/api/analytics");
    }

    #[test]
    fn test_beacon_needs_runtime() {
        let transport =
            HttpTransport::with_base_url("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let batch = Batch::new(Vec::new(), ClientContext::default());
        assert!(!transport.send_beacon(batch));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_server_fails() {
        let transport =
            HttpTransport::with_base_url("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let batch = Batch::new(Vec::new(), ClientContext::default());

        let err = transport.send(&batch).await.unwrap_err();
        assert!(matches!(err, Error::Collector(_)));
    }
}
