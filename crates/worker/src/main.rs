//! `canvas-worker` -- local image generation through ComfyUI.
//!
//! Launches ComfyUI, downloads the checkpoints the workflow needs, waits
//! for the server to come up and then answers prompts read from stdin,
//! one per line, with the path of the generated image on stdout.
//!
//! # Environment variables
//!
//! | Variable                  | Default               | Description                         |
//! |---------------------------|-----------------------|-------------------------------------|
//! | `COMFYUI_DIR`             | `.`                   | ComfyUI checkout to launch from     |
//! | `COMFYUI_PORT`            | `8188`                | Port ComfyUI listens on             |
//! | `WORKFLOW_PATH`           | `workflow_api.json`   | API-format workflow export          |
//! | `WORKFLOW_PROMPT_NODE`    | `6`                   | Node whose `text` input is replaced |
//! | `WORKFLOW_OUTPUT_NODE`    | last node             | Node whose image is returned        |
//! | `GENERATION_TIMEOUT_SECS` | `600`                 | Per-prompt deadline                 |
//!
//! See `ComfyConfig` for the full list.

use canvas_comfyui::config::ComfyConfig;
use canvas_comfyui::orchestrator::LocalOrchestrator;
use canvas_worker::serve_prompts;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas_worker=info,canvas_comfyui=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ComfyConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        comfy_dir = %config.comfy_dir.display(),
        api_url = %config.api_url(),
        workflow = %config.workflow_path.display(),
        "Starting canvas-worker",
    );

    let mut orchestrator = match LocalOrchestrator::setup(&config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "Setup failed");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            on_signal.cancel();
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let result = serve_prompts(
        &mut orchestrator,
        input,
        tokio::io::stdout(),
        config.generation_timeout,
        &cancel,
    )
    .await;

    match result {
        Ok(answered) => tracing::info!(answered, "Prompt loop finished"),
        Err(e) => tracing::error!(error = %e, "Prompt loop failed"),
    }

    orchestrator.shutdown().await;
}
