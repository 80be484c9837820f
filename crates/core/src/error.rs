use std::path::PathBuf;

/// Problems with externally supplied settings and secrets.
///
/// Raised before any network call is made. Each variant carries the name
/// of the offending variable so the message shown to the user points at
/// exactly one thing to fix.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not configured: {hint}")]
    Missing { name: &'static str, hint: &'static str },

    #[error("{name} is malformed: {reason}")]
    Malformed { name: &'static str, reason: String },

    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Errors raised while loading or mutating a workflow recipe.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow node {node_id:?} not found")]
    MissingNode { node_id: String },

    #[error("Workflow node {node_id:?} has no inputs object")]
    MalformedNode { node_id: String },

    #[error("Workflow graph is empty")]
    Empty,

    #[error("Failed to parse workflow: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read workflow {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
