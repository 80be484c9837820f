//! ComfyUI workflow recipes in API format.
//!
//! A workflow exported with "Save (API Format)" is a JSON object mapping
//! node IDs to `{"class_type": ..., "inputs": {...}}` records. Node order
//! is preserved exactly as loaded (serde_json's `preserve_order`), and
//! the graph is re-serialized verbatim on submission apart from the
//! inputs we overwrite.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;

/// Input field on a text-encode node that holds the prompt.
pub const PROMPT_INPUT_FIELD: &str = "text";

/// Ordered node graph in ComfyUI API format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph(Map<String, Value>);

impl WorkflowGraph {
    /// Parse a graph from its JSON text.
    ///
    /// Every node must be an object carrying an `inputs` object.
    pub fn from_json_str(json: &str) -> Result<Self, WorkflowError> {
        let graph: Self = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Build a graph from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, WorkflowError> {
        let graph: Self = serde_json::from_value(value)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Read and parse a `workflow_api.json` file.
    pub async fn load(path: &Path) -> Result<Self, WorkflowError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkflowError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        if self.0.is_empty() {
            return Err(WorkflowError::Empty);
        }
        for (node_id, node) in &self.0 {
            if !node.get("inputs").is_some_and(Value::is_object) {
                return Err(WorkflowError::MalformedNode {
                    node_id: node_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.0.contains_key(node_id)
    }

    /// Node IDs in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The most recently inserted node ID.
    pub fn last_node_id(&self) -> Option<&str> {
        self.0.keys().next_back().map(String::as_str)
    }

    /// Read a single input value of a node.
    pub fn input(&self, node_id: &str, field: &str) -> Option<&Value> {
        self.0.get(node_id)?.get("inputs")?.get(field)
    }

    /// Overwrite (or add) a single input value of a node.
    pub fn set_input(
        &mut self,
        node_id: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), WorkflowError> {
        let node = self
            .0
            .get_mut(node_id)
            .ok_or_else(|| WorkflowError::MissingNode {
                node_id: node_id.to_string(),
            })?;
        let inputs = node
            .get_mut("inputs")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| WorkflowError::MalformedNode {
                node_id: node_id.to_string(),
            })?;
        inputs.insert(field.to_string(), value.into());
        Ok(())
    }
}

/// A workflow graph plus the two nodes the orchestrator cares about.
///
/// `prompt_node` receives the user's text; completion of `output_node`
/// signals that the job's image is on disk. Both are checked against the
/// graph at construction.
#[derive(Debug, Clone)]
pub struct WorkflowRecipe {
    graph: WorkflowGraph,
    prompt_node: String,
    output_node: String,
}

impl WorkflowRecipe {
    /// Pair a graph with its prompt and output nodes.
    ///
    /// When `output_node` is `None` the last node of the graph is used,
    /// which matches how API-format exports place the `SaveImage` node.
    pub fn new(
        graph: WorkflowGraph,
        prompt_node: impl Into<String>,
        output_node: Option<String>,
    ) -> Result<Self, WorkflowError> {
        let prompt_node = prompt_node.into();
        let output_node = match output_node {
            Some(node) => node,
            None => {
                let last = graph.last_node_id().ok_or(WorkflowError::Empty)?;
                tracing::info!(
                    output_node = %last,
                    "No output node configured, using last workflow node",
                );
                last.to_string()
            }
        };

        for node_id in [&prompt_node, &output_node] {
            if !graph.contains(node_id) {
                return Err(WorkflowError::MissingNode {
                    node_id: node_id.clone(),
                });
            }
        }

        Ok(Self {
            graph,
            prompt_node,
            output_node,
        })
    }

    /// Load a recipe from a `workflow_api.json` file.
    pub async fn load(
        path: &Path,
        prompt_node: impl Into<String>,
        output_node: Option<String>,
    ) -> Result<Self, WorkflowError> {
        let graph = WorkflowGraph::load(path).await?;
        Self::new(graph, prompt_node, output_node)
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn prompt_node(&self) -> &str {
        &self.prompt_node
    }

    pub fn output_node(&self) -> &str {
        &self.output_node
    }

    /// Write the user's prompt into the prompt node's `text` input.
    pub fn inject_prompt(&mut self, prompt: &str) -> Result<(), WorkflowError> {
        self.graph
            .set_input(&self.prompt_node, PROMPT_INPUT_FIELD, prompt)
    }
}
