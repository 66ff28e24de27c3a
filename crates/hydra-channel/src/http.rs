//! HTTP client for a party's head node.

use std::time::Duration;

use hydra_core::{HeadAction, HeadStatus, HydraError, Result, UtxoSet};
use tracing::{debug, warn};

/// Timeout applied to head-state queries and fallback posts.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the HTTP side of a head node.
#[derive(Clone)]
pub struct HeadNodeClient {
    host: String,
    http_client: reqwest::Client,
    status_timeout: Duration,
}

impl HeadNodeClient {
    /// Create a client for nodes listening on `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http_client: reqwest::Client::new(),
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{}/{}", self.host, port, path)
    }

    /// `POST /<action>`, the fallback when the control channel is unusable.
    ///
    /// Returns the status code and the JSON body (or the raw text as a JSON string).
    pub async fn post_action(
        &self,
        port: u16,
        action: HeadAction,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, serde_json::Value)> {
        let url = self.url(port, action.path());
        debug!(port, action = %action, "posting head action over HTTP");

        let mut request = self.http_client.post(&url).timeout(self.status_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(port, e, Some(self.status_timeout)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text.clone()));

        if !status.is_success() {
            warn!(port, action = %action, status = status.as_u16(), "head node rejected action");
            return Err(HydraError::UpstreamRejected {
                port,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok((status.as_u16(), body))
    }

    /// `GET /head`: the node's current head status.
    pub async fn head_status(&self, port: u16) -> Result<HeadStatus> {
        let response = self
            .http_client
            .get(self.url(port, "head"))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| map_request_error(port, e, Some(self.status_timeout)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::UpstreamRejected {
                port,
                status: status.as_u16(),
                body: text,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HydraError::Protocol(format!("head state is not JSON: {}", e)))?;

        parse_head_status(&body)
    }

    /// `GET /snapshot/utxo`: the node's current view of the head ledger.
    pub async fn snapshot_utxo(&self, port: u16) -> Result<UtxoSet> {
        let response = self
            .http_client
            .get(self.url(port, "snapshot/utxo"))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| map_request_error(port, e, Some(self.status_timeout)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HydraError::UpstreamRejected {
                port,
                status: status.as_u16(),
                body: text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HydraError::Protocol(format!("snapshot is not a UTXO set: {}", e)))
    }
}

/// Accepts either `{"tag": "Open", ...}` or a bare `"Open"`.
fn parse_head_status(body: &serde_json::Value) -> Result<HeadStatus> {
    let tag = match body {
        serde_json::Value::String(tag) => Some(tag.as_str()),
        serde_json::Value::Object(map) => map.get("tag").and_then(|t| t.as_str()),
        _ => None,
    };

    tag.map(HeadStatus::from_tag)
        .ok_or_else(|| HydraError::Protocol(format!("head state has no tag: {}", body)))
}

fn map_request_error(port: u16, err: reqwest::Error, timeout: Option<Duration>) -> HydraError {
    if err.is_timeout() {
        return HydraError::UpstreamTimeout {
            port,
            duration_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
        };
    }
    if err.is_connect() {
        return HydraError::upstream_unavailable(port, "connection refused");
    }
    HydraError::upstream_unavailable(port, err.to_string())
}
