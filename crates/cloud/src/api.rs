//! REST client for the Replicate predictions API.
//!
//! [`ReplicateApi`] creates predictions, reads their status and asks for
//! cancellation. The poller only sees it through [`PredictionBackend`],
//! so tests can swap in a scripted backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::RemoteConfig;
use crate::prediction::Prediction;

/// Upper bound for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network, DNS, TLS, timeout or body decoding failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-2xx status code.
    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// The three prediction calls the poller needs.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    /// Start a prediction of `version` with `{"prompt": prompt}` as input.
    async fn create(&self, version: &str, prompt: &str) -> Result<Prediction, ApiError>;

    /// Fetch the current state from a prediction's status URL.
    async fn get(&self, url: &str) -> Result<Prediction, ApiError>;

    /// Ask for a prediction to be cancelled.
    async fn cancel(&self, url: &str) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// ReplicateApi
// ---------------------------------------------------------------------------

/// HTTP client for the predictions endpoints.
#[derive(Clone)]
pub struct ReplicateApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl ReplicateApi {
    /// * `api_url` - Base URL, e.g. `https://api.replicate.com`.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, api_url, token))
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, ApiError> {
        Self::new(config.api_url.clone(), config.api_token.clone())
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.token)
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PredictionBackend for ReplicateApi {
    async fn create(&self, version: &str, prompt: &str) -> Result<Prediction, ApiError> {
        let body = serde_json::json!({
            "version": version,
            "input": { "prompt": prompt },
        });

        let response = self
            .client
            .post(format!("{}/v1/predictions", self.api_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get(&self, url: &str) -> Result<Prediction, ApiError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn cancel(&self, url: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
