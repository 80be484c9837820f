//! Submitting a prediction and polling it to a terminal status.
//!
//! The poll loop sleeps a fixed interval before every status request and
//! stops on `succeeded`, `failed` or `canceled`. The whole loop is bounded
//! by [`PollOptions::timeout`] and a [`CancellationToken`]; when either
//! fires the prediction is cancelled upstream on a best-effort basis.

use std::time::Duration;

use canvas_core::error::ConfigError;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, PredictionBackend};
use crate::config::{ModelRef, RemoteConfig};
use crate::prediction::{PredictionStatus, RemoteJob};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The API answered successfully but without something it promises.
    #[error("Unexpected API response: {0}")]
    ContractViolation(String),

    #[error("Prediction {status:?}: {message}")]
    JobFailed {
        status: PredictionStatus,
        message: String,
    },

    #[error("Prediction did not finish within {timeout:?} ({polls} polls)")]
    Timeout { timeout: Duration, polls: u32 },

    #[error("Prediction cancelled after {polls} polls")]
    Cancelled { polls: u32 },
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Sleep before each status request.
    pub interval: Duration,
    /// Bound on the whole loop.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl From<&RemoteConfig> for PollOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Submit / poll
// ---------------------------------------------------------------------------

/// Start a prediction and return the job to poll.
pub async fn submit<B>(backend: &B, model: &ModelRef, prompt: &str) -> Result<RemoteJob, RemoteError>
where
    B: PredictionBackend + ?Sized,
{
    let prediction = backend.create(&model.version, prompt).await?;

    let status_url = prediction.urls.get.ok_or_else(|| {
        RemoteError::ContractViolation("the API did not return a status URL".into())
    })?;

    tracing::info!(
        prediction_id = prediction.id.as_deref().unwrap_or("-"),
        model = %model,
        "Prediction created"
    );

    Ok(RemoteJob {
        id: prediction.id,
        status_url,
        cancel_url: prediction.urls.cancel,
        status: prediction.status,
        output: prediction.output,
        error: prediction.error,
        polls: 0,
    })
}

/// Poll `job` until it reaches a terminal status and return the first
/// output URL.
///
/// `job` is updated in place, so the caller can inspect the final status
/// and the number of polls on any outcome.
pub async fn poll<B>(
    backend: &B,
    job: &mut RemoteJob,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<String, RemoteError>
where
    B: PredictionBackend + ?Sized,
{
    let stop = tokio::select! {
        _ = cancel.cancelled() => Stop::Cancelled,
        result = tokio::time::timeout(options.timeout, poll_until_terminal(backend, &mut *job, options.interval)) => {
            match result {
                Ok(done) => Stop::Done(done),
                Err(_) => Stop::TimedOut,
            }
        }
    };

    match stop {
        Stop::Done(done) => done?,
        Stop::Cancelled => {
            tracing::info!(polls = job.polls, "Polling cancelled");
            cancel_best_effort(backend, job).await;
            return Err(RemoteError::Cancelled { polls: job.polls });
        }
        Stop::TimedOut => {
            tracing::warn!(polls = job.polls, timeout = ?options.timeout, "Prediction timed out");
            cancel_best_effort(backend, job).await;
            return Err(RemoteError::Timeout {
                timeout: options.timeout,
                polls: job.polls,
            });
        }
    }

    match job.status {
        PredictionStatus::Succeeded => {
            let url = job
                .output
                .as_ref()
                .and_then(|output| output.first())
                .ok_or_else(|| {
                    RemoteError::ContractViolation("prediction succeeded without output".into())
                })?;
            tracing::info!(polls = job.polls, url = %url, "Prediction succeeded");
            Ok(url.to_string())
        }
        status => {
            let message = job
                .error
                .clone()
                .unwrap_or_else(|| "no error message".to_string());
            tracing::warn!(?status, error = %message, "Prediction did not succeed");
            Err(RemoteError::JobFailed { status, message })
        }
    }
}

/// Submit `prompt` to `model` and wait for the output URL.
pub async fn generate<B>(
    backend: &B,
    model: &ModelRef,
    prompt: &str,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<String, RemoteError>
where
    B: PredictionBackend + ?Sized,
{
    let mut job = submit(backend, model, prompt).await?;
    poll(backend, &mut job, options, cancel).await
}

// ---- private helpers ----

enum Stop {
    Done(Result<(), RemoteError>),
    TimedOut,
    Cancelled,
}

async fn poll_until_terminal<B>(
    backend: &B,
    job: &mut RemoteJob,
    interval: Duration,
) -> Result<(), RemoteError>
where
    B: PredictionBackend + ?Sized,
{
    loop {
        tokio::time::sleep(interval).await;

        let prediction = backend.get(&job.status_url).await?;
        job.polls += 1;
        job.update(prediction);
        tracing::debug!(poll = job.polls, status = ?job.status, "Prediction status");

        if job.status.is_terminal() {
            return Ok(());
        }
    }
}

async fn cancel_best_effort<B>(backend: &B, job: &RemoteJob)
where
    B: PredictionBackend + ?Sized,
{
    let Some(url) = job.cancel_url.as_deref() else {
        tracing::debug!("No cancel URL, leaving prediction running");
        return;
    };
    if let Err(e) = backend.cancel(url).await {
        tracing::warn!(url = %url, error = %e, "Failed to cancel prediction");
    }
}
