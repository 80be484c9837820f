//! Capability traits the local orchestrator is written against.
//!
//! [`ComfyBackend`] covers everything the orchestrator asks of a running
//! ComfyUI server; [`EventSource`] is one open event stream. The real
//! implementations are [`ComfyUIServer`] and
//! [`ComfyUIConnection`](crate::client::ComfyUIConnection); tests
//! substitute in-memory fakes.

use async_trait::async_trait;
use canvas_core::workflow::WorkflowGraph;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection};
use crate::readiness::ProbeError;

/// An open stream of ComfyUI event frames.
#[async_trait]
pub trait EventSource: Send {
    /// Client ID the stream was opened with.
    fn client_id(&self) -> &str;

    /// Next text frame, or `None` once the stream has closed.
    async fn next_frame(&mut self) -> Option<Result<String, ComfyUIClientError>>;

    /// Close the stream. Errors are logged, not returned.
    async fn close(&mut self);
}

/// Operations the orchestrator needs from a ComfyUI server.
#[async_trait]
pub trait ComfyBackend: Send + Sync {
    type Events: EventSource;

    /// One reachability check against the server.
    async fn probe(&self) -> Result<(), ProbeError>;

    /// Open the event stream. Must happen before [`submit`](Self::submit)
    /// so no early event is missed.
    async fn open_events(&self) -> Result<Self::Events, ComfyUIClientError>;

    /// Queue a workflow and return its prompt ID.
    async fn submit(&self, graph: &WorkflowGraph, client_id: &str)
        -> Result<String, ComfyUIApiError>;

    /// Stop a prompt, dropping it from the queue or interrupting it if it
    /// is already executing.
    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;
}

/// A ComfyUI server reached over HTTP and WebSocket.
#[derive(Clone)]
pub struct ComfyUIServer {
    api: ComfyUIApi,
    client: ComfyUIClient,
}

impl ComfyUIServer {
    pub fn new(api: ComfyUIApi, client: ComfyUIClient) -> Self {
        Self { api, client }
    }

    /// Build both clients from base URLs.
    pub fn from_urls(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self::new(ComfyUIApi::new(api_url), ComfyUIClient::new(ws_url))
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }
}

#[async_trait]
impl ComfyBackend for ComfyUIServer {
    type Events = ComfyUIConnection;

    async fn probe(&self) -> Result<(), ProbeError> {
        match self.api.history_status().await {
            Ok(status) => {
                tracing::debug!(status, "ComfyUI answered readiness probe");
                Ok(())
            }
            Err(e) if e.is_unreachable() => Err(ProbeError::NotReady(e.to_string())),
            Err(e) => Err(ProbeError::Failed(e.to_string())),
        }
    }

    async fn open_events(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        self.client.connect().await
    }

    async fn submit(
        &self,
        graph: &WorkflowGraph,
        client_id: &str,
    ) -> Result<String, ComfyUIApiError> {
        let response = self.api.submit_workflow(graph, client_id).await?;
        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_number = response.number,
            "Workflow submitted to ComfyUI",
        );
        Ok(response.prompt_id)
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        // Both requests go out so the prompt stops whether queued or running.
        let dequeued = self.api.cancel_execution(prompt_id).await;
        let interrupted = self.api.interrupt(prompt_id).await;
        dequeued.and(interrupted)
    }
}
