//! Prediction wire types and the state of one remote job.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    /// Queued, waiting for a worker.
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Any status string this client does not know; polling continues.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// Whether no further status change can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
    pub cancel: Option<String>,
}

/// Prediction output: most models return a list of file URLs, some a
/// single URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl PredictionOutput {
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Many(urls) => urls.first().map(String::as_str),
            Self::One(url) => Some(url.as_str()),
        }
    }
}

/// Prediction body as returned by create and get.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    pub status: PredictionStatus,
    #[serde(default)]
    pub urls: PredictionUrls,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A submitted prediction followed by the poller.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub id: Option<String>,
    pub status_url: String,
    pub cancel_url: Option<String>,
    pub status: PredictionStatus,
    pub output: Option<PredictionOutput>,
    pub error: Option<String>,
    /// Status requests made so far.
    pub polls: u32,
}

impl RemoteJob {
    /// Fold a fresh status response into the job.
    pub fn update(&mut self, prediction: Prediction) {
        self.status = prediction.status;
        self.output = prediction.output;
        self.error = prediction.error;
        if let Some(cancel) = prediction.urls.cancel {
            self.cancel_url = Some(cancel);
        }
    }
}
