//! Request loop for the local image worker.
//!
//! Reads one prompt per line and answers each with one line: the path of
//! the generated image, or `error: <message>`. Blank lines are ignored.

use std::time::Duration;

use canvas_comfyui::backend::ComfyBackend;
use canvas_comfyui::orchestrator::LocalOrchestrator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Serve prompts from `input` until end of input or cancellation.
///
/// Returns the number of prompts answered. Generation failures are
/// reported on `output` and do not stop the loop; I/O errors on either
/// stream do.
pub async fn serve_prompts<B, R, W>(
    orchestrator: &mut LocalOrchestrator<B>,
    input: R,
    mut output: W,
    timeout: Duration,
    cancel: &CancellationToken,
) -> std::io::Result<u32>
where
    B: ComfyBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let reply = match orchestrator.generate(prompt, timeout, cancel).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Generation complete");
                path.display().to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                format!("error: {e}")
            }
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        answered += 1;
    }

    Ok(answered)
}
