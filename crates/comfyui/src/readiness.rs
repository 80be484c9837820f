//! Readiness probe for a freshly spawned ComfyUI server.
//!
//! [`ReadinessProbe::wait`] polls the backend at a fixed interval until
//! it answers, fails with a non-connect error, or the timeout elapses.

use std::time::Duration;

use tokio::time::Instant;

use crate::backend::ComfyBackend;

/// Interval between reachability checks.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Default time allowed for the server to come up.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of the spawned server as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Ready,
    Failed,
}

/// Outcome of a single failed reachability check.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Nothing is accepting connections yet; retry.
    #[error("Server not reachable yet: {0}")]
    NotReady(String),

    /// The server is reachable but the probe failed in a way retrying
    /// will not fix.
    #[error("Readiness probe failed: {0}")]
    Failed(String),
}

/// Errors from [`ReadinessProbe::wait`].
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("Server did not become ready within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Fixed-interval poller with an overall deadline.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    interval: Duration,
    timeout: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_READINESS_TIMEOUT)
    }
}

impl ReadinessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            timeout,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until `backend` answers a probe.
    ///
    /// Unreachable-server failures (refused or timed out) are retried every `interval`;
    /// any other failure is returned immediately. The final sleep is
    /// clamped so a server that never comes up fails at the timeout,
    /// not up to one interval past it.
    pub async fn wait<B>(&self, backend: &B) -> Result<ServerState, ReadinessError>
    where
        B: ComfyBackend + ?Sized,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            // Each check is bounded by the overall deadline.
            let Ok(outcome) = tokio::time::timeout_at(deadline, backend.probe()).await else {
                return Err(self.timed_out(attempts));
            };
            match outcome {
                Ok(()) => {
                    tracing::info!(
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "ComfyUI server is ready",
                    );
                    return Ok(ServerState::Ready);
                }
                Err(ProbeError::NotReady(reason)) => {
                    tracing::trace!(attempts, reason = %reason, "ComfyUI not reachable yet");
                }
                Err(e @ ProbeError::Failed(_)) => {
                    tracing::error!(attempts, error = %e, "Readiness probe failed");
                    return Err(e.into());
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(self.timed_out(attempts));
            }

            tokio::time::sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }

    fn timed_out(&self, attempts: u32) -> ReadinessError {
        tracing::error!(
            attempts,
            timeout_secs = self.timeout.as_secs_f64(),
            "ComfyUI server did not start in time",
        );
        ReadinessError::Timeout {
            timeout: self.timeout,
        }
    }
}
