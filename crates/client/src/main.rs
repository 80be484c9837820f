//! `canvas-client` -- generate an image with the hosted model.
//!
//! Usage: `canvas-client [PROMPT...]`. The prompt words are joined with
//! spaces; without arguments a sample prompt is used. On success the
//! output URL is printed to stdout; on failure the error is printed to
//! stderr and the exit code is 1.
//!
//! # Environment variables
//!
//! | Variable              | Required | Default                     |
//! |-----------------------|----------|-----------------------------|
//! | `REPLICATE_API_TOKEN` | yes      | --                          |
//! | `MODEL_ENDPOINT`      | yes      | -- (`owner/name:version`)   |
//! | `REPLICATE_API_URL`   | no       | `https://api.replicate.com` |
//! | `POLL_INTERVAL_SECS`  | no       | `3`                         |
//! | `POLL_TIMEOUT_SECS`   | no       | `600`                       |

use anyhow::Context;
use canvas_cloud::api::ReplicateApi;
use canvas_cloud::config::RemoteConfig;
use canvas_cloud::poller::{generate, PollOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PROMPT: &str =
    "A cinematic photo of a bio-luminescent forest at night, detailed, 8k, hyper-realistic";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "canvas_client=info,canvas_cloud=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let prompt = if args.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        args.join(" ")
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match run(&prompt, &cancel).await {
        Ok(url) => println!("{url}"),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(prompt: &str, cancel: &CancellationToken) -> anyhow::Result<String> {
    let config = RemoteConfig::from_env()?;
    let api = ReplicateApi::from_config(&config).context("failed to build HTTP client")?;

    tracing::info!(model = %config.model, "Sending prompt");
    let url = generate(&api, &config.model, prompt, &PollOptions::from(&config), cancel).await?;
    Ok(url)
}
