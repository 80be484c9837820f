//! Waits on the event stream for a prompt's output image.
//!
//! Reads frames from an [`EventSource`] until the designated output node
//! reports `executed`, then resolves the first image it wrote against
//! the server's output directory. The wait is bounded by a timeout and a
//! [`CancellationToken`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::EventSource;
use crate::client::ComfyUIClientError;
use crate::messages::{parse_message, ComfyUIMessage, OutputImage};

/// What the listener is waiting for.
#[derive(Debug, Clone, Copy)]
pub struct OutputTarget<'a> {
    pub prompt_id: &'a str,
    pub output_node: &'a str,
    pub output_dir: &'a Path,
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Timed out after {timeout:?} waiting for node {node} to finish")]
    Timeout { timeout: Duration, node: String },

    #[error("Wait for prompt {prompt_id} was cancelled")]
    Cancelled { prompt_id: String },

    #[error("Event stream closed before node {node} finished")]
    ConnectionClosed { node: String },

    #[error("Event stream failed: {0}")]
    Connection(#[from] ComfyUIClientError),

    #[error("Prompt {prompt_id} failed in node {node_id}: {message}")]
    ExecutionFailed {
        prompt_id: String,
        node_id: String,
        message: String,
    },

    #[error("Prompt {prompt_id} was interrupted")]
    Interrupted { prompt_id: String },

    #[error("Node {node} finished without producing an image")]
    NoOutput { node: String },
}

/// Wait until `target.output_node` has executed and return the path of
/// its first image.
pub async fn await_output<E>(
    events: &mut E,
    target: &OutputTarget<'_>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PathBuf, ListenerError>
where
    E: EventSource + ?Sized,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(ListenerError::Cancelled {
            prompt_id: target.prompt_id.to_string(),
        }),
        result = tokio::time::timeout(timeout, watch(events, target)) => match result {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                tracing::warn!(
                    prompt_id = %target.prompt_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Gave up waiting for ComfyUI output",
                );
                Err(ListenerError::Timeout {
                    timeout,
                    node: target.output_node.to_string(),
                })
            }
        },
    }
}

/// Resolve an image reported by ComfyUI to a path under `output_dir`.
pub fn resolve_output_path(output_dir: &Path, image: &OutputImage) -> PathBuf {
    if image.subfolder.is_empty() {
        output_dir.join(&image.filename)
    } else {
        output_dir.join(&image.subfolder).join(&image.filename)
    }
}

async fn watch<E>(events: &mut E, target: &OutputTarget<'_>) -> Result<PathBuf, ListenerError>
where
    E: EventSource + ?Sized,
{
    while let Some(frame) = events.next_frame().await {
        let text = frame?;
        let message = match parse_message(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI frame");
                continue;
            }
        };

        match message {
            ComfyUIMessage::Executed(data) => {
                if !is_same_prompt(data.prompt_id.as_deref(), target.prompt_id) {
                    continue;
                }
                if data.node != target.output_node {
                    tracing::debug!(prompt_id = %target.prompt_id, node = %data.node, "Node executed");
                    continue;
                }
                let Some(image) = data.output.images.first() else {
                    return Err(ListenerError::NoOutput { node: data.node });
                };
                let path = resolve_output_path(target.output_dir, image);
                tracing::info!(
                    prompt_id = %target.prompt_id,
                    path = %path.display(),
                    "Image generated",
                );
                return Ok(path);
            }
            ComfyUIMessage::ExecutionError(data) if data.prompt_id == target.prompt_id => {
                tracing::error!(
                    prompt_id = %data.prompt_id,
                    node_id = %data.node_id,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
                return Err(ListenerError::ExecutionFailed {
                    prompt_id: data.prompt_id,
                    node_id: data.node_id,
                    message: data.exception_message,
                });
            }
            ComfyUIMessage::ExecutionInterrupted(data) if data.prompt_id == target.prompt_id => {
                return Err(ListenerError::Interrupted {
                    prompt_id: data.prompt_id,
                });
            }
            ComfyUIMessage::Progress(data) => {
                tracing::trace!(value = data.value, max = data.max, "Generation progress");
            }
            other => {
                tracing::trace!(message = ?other, "Ignoring ComfyUI message");
            }
        }
    }

    Err(ListenerError::ConnectionClosed {
        node: target.output_node.to_string(),
    })
}

/// Events without a prompt ID are attributed to the prompt we submitted;
/// the client ID already scopes the stream to this orchestrator.
fn is_same_prompt(event_prompt: Option<&str>, ours: &str) -> bool {
    event_prompt.map_or(true, |id| id == ours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(filename: &str, subfolder: &str) -> OutputImage {
        OutputImage {
            filename: filename.into(),
            subfolder: subfolder.into(),
            kind: "output".into(),
        }
    }

    #[test]
    fn resolves_against_output_dir() {
        let path = resolve_output_path(Path::new("output"), &image("a.png", ""));
        assert_eq!(path, Path::new("output/a.png"));
    }

    #[test]
    fn resolves_subfolder() {
        let path = resolve_output_path(Path::new("output"), &image("a.png", "portraits"));
        assert_eq!(path, Path::new("output/portraits/a.png"));
    }

    #[test]
    fn missing_prompt_id_matches() {
        assert!(is_same_prompt(None, "p1"));
        assert!(is_same_prompt(Some("p1"), "p1"));
        assert!(!is_same_prompt(Some("p2"), "p1"));
    }
}
