use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// Failure talking to the upstream market-data API.
///
/// `Status` carries the upstream's own status code and response body as
/// diagnostic text; `Transport` covers network-level failures that never
/// produced a status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream request failed: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Upstream status code, 0 for transport-level failures.
    pub fn status(&self) -> u16 {
        match self {
            UpstreamError::Status { status, .. } => *status,
            UpstreamError::Transport(_) => 0,
        }
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Issue a single GET for `url`. No retries; the caller owns URL
    /// construction.
    async fn fetch(&self, url: &str) -> Result<Value, UpstreamError>;
}

pub struct HttpUpstreamClient {
    client: Client,
    api_key: Option<String>,
}

impl HttpUpstreamClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch(&self, url: &str) -> Result<Value, UpstreamError> {
        debug!(%url, "fetching upstream");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable body: {e}"));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_upstream_diagnostics() {
        let err = UpstreamError::Status {
            status: 429,
            body: "Throttled".into(),
        };
        assert_eq!(err.status(), 429);
        assert_eq!(err.to_string(), "upstream returned 429: Throttled");
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = UpstreamError::Transport("connection refused".into());
        assert_eq!(err.status(), 0);
    }
}
