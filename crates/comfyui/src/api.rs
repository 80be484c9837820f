//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, queue cancellation and the `/history`
//! endpoint used as a readiness target, using [`reqwest`].

use std::time::Duration;

use canvas_core::workflow::WorkflowGraph;
use serde::Deserialize;

/// Upper bound on a single `/history` request, connect included.
pub const HISTORY_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    /// Whether the server could not be reached or did not answer in
    /// time (nothing listening yet, connection refused, connect or
    /// request timeout).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_connect() || e.is_timeout())
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the graph and the WebSocket client ID,
    /// so that progress events for this prompt are routed to that
    /// connection.
    pub async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a queued prompt.
    ///
    /// Sends `POST /queue` with `{"delete": [prompt_id]}`. A prompt that
    /// is already running is not affected.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Stop a running prompt.
    ///
    /// Sends `POST /interrupt` with `{"prompt_id": prompt_id}`; the server
    /// only interrupts when that prompt is the one executing.
    pub async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt_id": prompt_id,
        });

        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Issue `GET /history` and return the HTTP status code.
    ///
    /// Any response at all means the server is accepting connections;
    /// the status is returned for logging only.
    pub async fn history_status(&self) -> Result<u16, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history", self.api_url))
            .timeout(HISTORY_REQUEST_TIMEOUT)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
