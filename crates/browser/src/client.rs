//! DevTools endpoint client.
//!
//! [`CdpClient`] talks to a headless browser's DevTools HTTP endpoint
//! to open and close page targets, and dials the WebSocket debugger
//! URL of a target to establish the live protocol connection.

use serde::Deserialize;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::SurfaceError;

/// Client for one browser's DevTools endpoint.
pub struct CdpClient {
    http: reqwest::Client,
    devtools_url: String,
}

/// A page target as reported by the DevTools endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PageTarget {
    pub id: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_url: String,
}

impl CdpClient {
    /// Create a client for the DevTools endpoint at `devtools_url`
    /// (e.g. `http://127.0.0.1:9222`).
    pub fn new(devtools_url: impl Into<String>) -> Self {
        let devtools_url = devtools_url.into();
        Self {
            http: reqwest::Client::new(),
            devtools_url: devtools_url.trim_end_matches('/').to_string(),
        }
    }

    /// DevTools endpoint base URL.
    pub fn devtools_url(&self) -> &str {
        &self.devtools_url
    }

    /// Open a fresh page target (about:blank) and return its handle.
    pub async fn open_page(&self) -> Result<PageTarget, SurfaceError> {
        let endpoint = format!("{}/json/new", self.devtools_url);
        let response = self
            .http
            .put(&endpoint)
            .send()
            .await
            .map_err(|e| SurfaceError::Connection(format!("failed to reach {endpoint}: {e}")))?;

        let response = Self::ensure_success(response).await?;
        let target = response
            .json::<PageTarget>()
            .await
            .map_err(|e| SurfaceError::Connection(format!("malformed target descriptor: {e}")))?;

        tracing::info!(target_id = %target.id, "Opened browser page target");
        Ok(target)
    }

    /// Close a page target through the DevTools endpoint.
    pub async fn close_page(&self, target_id: &str) -> Result<(), SurfaceError> {
        let endpoint = format!("{}/json/close/{}", self.devtools_url, target_id);
        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| SurfaceError::Connection(format!("failed to reach {endpoint}: {e}")))?;

        Self::ensure_success(response).await?;
        tracing::info!(target_id = %target_id, "Closed browser page target");
        Ok(())
    }

    /// Dial the WebSocket debugger URL of a target.
    pub async fn connect(
        &self,
        target: &PageTarget,
    ) -> Result<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, SurfaceError> {
        let (ws_stream, _response) = connect_async(&target.ws_url).await.map_err(|e| {
            SurfaceError::Connection(format!(
                "failed to connect to DevTools target at {}: {e}",
                target.ws_url
            ))
        })?;

        tracing::info!(target_id = %target.id, "Connected to DevTools target");
        Ok(ws_stream)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or surface the
    /// status and body for debugging.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SurfaceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SurfaceError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
