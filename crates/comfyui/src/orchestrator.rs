//! Local job orchestration against a ComfyUI server.
//!
//! [`LocalOrchestrator`] is the context object for one server: it owns
//! the spawned process, the loaded recipe and the backend clients.
//! [`LocalOrchestrator::setup`] performs the one-time startup sequence;
//! [`LocalOrchestrator::generate`] runs one prompt to completion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use canvas_core::error::WorkflowError;
use canvas_core::workflow::WorkflowRecipe;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApiError;
use crate::assets::{AssetError, AssetFetcher};
use crate::backend::{ComfyBackend, ComfyUIServer, EventSource};
use crate::client::ComfyUIClientError;
use crate::config::ComfyConfig;
use crate::listener::{await_output, ListenerError, OutputTarget};
use crate::readiness::{ReadinessError, ReadinessProbe, ServerState};
use crate::supervisor::{ServerProcess, ServerSupervisor, SupervisorError};

/// Errors surfaced by the local orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum LocalError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Failed to submit workflow: {0}")]
    Submit(#[from] ComfyUIApiError),

    #[error("Failed to open event stream: {0}")]
    Events(#[from] ComfyUIClientError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("ComfyUI server is not ready (state: {0:?})")]
    NotReady(ServerState),
}

/// Owns everything needed to run prompts through one ComfyUI server.
pub struct LocalOrchestrator<B: ComfyBackend> {
    backend: B,
    recipe: WorkflowRecipe,
    output_dir: PathBuf,
    state: ServerState,
    process: Option<ServerProcess>,
}

impl LocalOrchestrator<ComfyUIServer> {
    /// Launch ComfyUI, fetch checkpoints, load the recipe and wait for
    /// the server to come up.
    ///
    /// Any failure here is fatal to the orchestrator; the spawned
    /// process is killed when the partially built state is dropped.
    pub async fn setup(config: &ComfyConfig) -> Result<Self, LocalError> {
        tracing::info!("Starting setup");

        let process = ServerSupervisor::from_config(config).start().await?;

        let fetcher = AssetFetcher::new()?;
        for url in &config.checkpoint_urls {
            fetcher.fetch(url, &config.checkpoint_dir).await?;
        }

        let recipe = WorkflowRecipe::load(
            &config.workflow_path,
            config.prompt_node.clone(),
            config.output_node.clone(),
        )
        .await?;

        let backend = ComfyUIServer::from_urls(config.api_url(), config.ws_url());
        let mut orchestrator =
            Self::new(backend, recipe, config.output_dir.clone()).with_process(process);

        let probe = ReadinessProbe::new(config.readiness_timeout);
        if let Err(e) = orchestrator.wait_until_ready(&probe).await {
            if let Some(status) = orchestrator
                .process
                .as_mut()
                .and_then(ServerProcess::try_exit_status)
            {
                tracing::error!(%status, "ComfyUI server exited during startup");
            }
            return Err(e);
        }

        tracing::info!("Setup complete");
        Ok(orchestrator)
    }
}

impl<B: ComfyBackend> LocalOrchestrator<B> {
    /// Wrap an already running backend. The server starts out as
    /// [`ServerState::Starting`] until [`wait_until_ready`](Self::wait_until_ready)
    /// succeeds.
    pub fn new(backend: B, recipe: WorkflowRecipe, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            recipe,
            output_dir: output_dir.into(),
            state: ServerState::Starting,
            process: None,
        }
    }

    /// Attach the server process so it lives (and dies) with the
    /// orchestrator.
    pub fn with_process(mut self, process: ServerProcess) -> Self {
        self.process = Some(process);
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn recipe(&self) -> &WorkflowRecipe {
        &self.recipe
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the readiness probe and record the resulting state.
    pub async fn wait_until_ready(&mut self, probe: &ReadinessProbe) -> Result<(), LocalError> {
        match probe.wait(&self.backend).await {
            Ok(state) => {
                self.state = state;
                Ok(())
            }
            Err(e) => {
                self.state = ServerState::Failed;
                Err(e.into())
            }
        }
    }

    /// Run one prompt through the workflow and return the image path.
    ///
    /// The event stream is opened before the workflow is submitted so
    /// no early event is missed. On timeout or cancellation the prompt is
    /// dropped from the server's queue and interrupted if it is running.
    pub async fn generate(
        &mut self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, LocalError> {
        if self.state != ServerState::Ready {
            return Err(LocalError::NotReady(self.state));
        }

        tracing::info!(prompt = %prompt, "Received generation request");
        self.recipe.inject_prompt(prompt)?;

        let mut events = self.backend.open_events().await?;
        let client_id = events.client_id().to_string();

        let prompt_id = match self.backend.submit(self.recipe.graph(), &client_id).await {
            Ok(prompt_id) => prompt_id,
            Err(e) => {
                events.close().await;
                return Err(e.into());
            }
        };

        let target = OutputTarget {
            prompt_id: &prompt_id,
            output_node: self.recipe.output_node(),
            output_dir: &self.output_dir,
        };
        let result = await_output(&mut events, &target, timeout, cancel).await;
        events.close().await;

        if let Err(ListenerError::Timeout { .. } | ListenerError::Cancelled { .. }) = &result {
            if let Err(e) = self.backend.cancel(&prompt_id).await {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to cancel prompt");
            }
        }

        Ok(result?)
    }

    /// Stop the server process, if this orchestrator owns one.
    pub async fn shutdown(self) {
        if let Some(process) = self.process {
            process.shutdown().await;
        }
    }
}
