//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`ComfyUIMessage`] enum.

use serde::{Deserialize, Deserializer};

/// The ComfyUI WebSocket message types the orchestrator understands.
///
/// Deserialized via the adjacently-tagged `"type"` field with
/// associated `"data"` content. Anything else fails to parse and is
/// skipped by the listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(PromptData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node has finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Every node of a prompt has finished.
    #[serde(rename = "execution_success")]
    ExecutionSuccess(PromptData),

    /// Execution was interrupted (e.g. via `/interrupt`).
    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(PromptData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload carrying only the prompt it refers to.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptData {
    pub prompt_id: String,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    /// Node IDs whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    /// Cached nodes without UI output report `null` here.
    #[serde(default, deserialize_with = "null_as_default")]
    pub output: NodeOutput,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Files a node reported. Only images are tracked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<OutputImage>,
}

/// One image written by a node, relative to the server's output folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output` for saved images, `temp` for previews.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log and continue.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
