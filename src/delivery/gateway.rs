//! HTTP delivery to a collection gateway.
//!
//! Batches are posted as one JSON document to `<base>/v1/events` with a
//! bearer token. Any non-2xx answer is a delivery failure and the buffer
//! retries it.

use super::event::TelemetryEvent;
use super::sink::{DeliveryError, DeliverySink};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Load port and token from `gateway.port` and `gateway.token` in
    /// `runtime_dir`. The gateway writes both files when it starts.
    pub fn from_runtime_dir(runtime_dir: &Path) -> Result<Self, DeliveryError> {
        let port_path = runtime_dir.join("gateway.port");
        let token_path = runtime_dir.join("gateway.token");

        let port_str = std::fs::read_to_string(&port_path).map_err(|e| {
            DeliveryError::Rejected(format!(
                "failed to read gateway port from {port_path:?}: {e}"
            ))
        })?;
        let port: u16 = port_str.trim().parse().map_err(|e| {
            DeliveryError::Rejected(format!("invalid port number '{}': {}", port_str.trim(), e))
        })?;

        let token = std::fs::read_to_string(&token_path)
            .map_err(|e| {
                DeliveryError::Rejected(format!(
                    "failed to read gateway token from {token_path:?}: {e}"
                ))
            })?
            .trim()
            .to_string();

        Ok(Self::new("127.0.0.1", port, token))
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn events_url(&self) -> String {
        format!("{}/v1/events", self.url())
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Request body posted for each batch.
#[derive(Debug, Serialize)]
pub struct EventBatchPayload<'a> {
    pub session_id: &'a str,
    pub device_id: &'a str,
    pub timezone: String,
    pub events: &'a [TelemetryEvent],
    pub meta: BatchMeta,
}

#[derive(Debug, Serialize)]
pub struct BatchMeta {
    pub source: String,
    pub version: String,
    pub event_count: usize,
}

/// Sink posting batches to the gateway over HTTP.
pub struct HttpSink {
    config: GatewayConfig,
    client: reqwest::Client,
    device_id: String,
}

impl HttpSink {
    pub fn new(config: GatewayConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Network(format!("failed to create HTTP client: {e}")))?;

        // Device ID from hostname + instance
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!(
            "workflow-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            config,
            client,
            device_id,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Whether the gateway answers its health check.
    pub async fn test_connection(&self) -> Result<bool, DeliveryError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    pub fn payload<'a>(
        &'a self,
        events: &'a [TelemetryEvent],
        session_id: &'a str,
    ) -> EventBatchPayload<'a> {
        EventBatchPayload {
            session_id,
            device_id: &self.device_id,
            timezone: chrono_tz::Tz::UTC.to_string(),
            events,
            meta: BatchMeta {
                source: "workflow-sensor-agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                event_count: events.len(),
            },
        }
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn send(&self, events: &[TelemetryEvent], session_id: &str) -> Result<(), DeliveryError> {
        let payload = self.payload(events, session_id);

        let response = self
            .client
            .post(self.config.events_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_url() {
        let config = GatewayConfig::new("127.0.0.1", 8080, "test-token");
        assert_eq!(config.url(), "http://127.0.0.1:8080");
        assert_eq!(config.events_url(), "http://127.0.0.1:8080/v1/events");
        assert_eq!(config.health_url(), "http://127.0.0.1:8080/health");
    }

    #[test]
    fn test_config_from_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gateway.port"), "9911\n").unwrap();
        std::fs::write(dir.path().join("gateway.token"), " secret \n").unwrap();

        let config = GatewayConfig::from_runtime_dir(dir.path()).unwrap();
        assert_eq!(config.port, 9911);
        assert_eq!(config.token, "secret");

        let empty = tempfile::tempdir().unwrap();
        assert!(GatewayConfig::from_runtime_dir(empty.path()).is_err());
    }

    #[test]
    fn test_payload_shape() {
        let sink = HttpSink::new(GatewayConfig::new("127.0.0.1", 1, "t")).unwrap();
        let events = vec![TelemetryEvent::app_focus("S1", "cursor")];
        let value = serde_json::to_value(sink.payload(&events, "S1")).unwrap();

        assert_eq!(value["session_id"], "S1");
        assert_eq!(value["timezone"], "UTC");
        assert_eq!(value["meta"]["event_count"], 1);
        assert_eq!(value["events"][0]["type"], "app_focus");
        assert!(value["device_id"]
            .as_str()
            .unwrap()
            .starts_with("workflow-"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_network_error() {
        // Port 1 is reserved and closed on test hosts.
        let sink = HttpSink::new(GatewayConfig::new("127.0.0.1", 1, "t")).unwrap();
        let events = vec![TelemetryEvent::app_focus("S1", "cursor")];
        assert!(matches!(
            sink.send(&events, "S1").await,
            Err(DeliveryError::Network(_))
        ));
    }
}
