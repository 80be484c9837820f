//! Launches the ComfyUI server as a child process.
//!
//! [`ServerSupervisor::start`] resets the working directories and spawns
//! `python main.py --listen <host> --port <port> ...`. The returned
//! [`ServerProcess`] owns the child for the life of the orchestrator;
//! dropping it kills the server.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::config::ComfyConfig;

/// Errors raised while preparing or launching the server.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to reset directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn ComfyUI ({program}): {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Spawns ComfyUI with a fixed address and fixed working directories.
#[derive(Debug, Clone)]
pub struct ServerSupervisor {
    comfy_dir: PathBuf,
    python: String,
    host: String,
    port: u16,
    output_dir: PathBuf,
    input_dir: PathBuf,
}

/// Handle to the running server process.
pub struct ServerProcess {
    child: Child,
}

impl ServerSupervisor {
    pub fn from_config(config: &ComfyConfig) -> Self {
        Self {
            comfy_dir: config.comfy_dir.clone(),
            python: config.python.clone(),
            host: config.host.clone(),
            port: config.port,
            output_dir: config.output_dir.clone(),
            input_dir: config.input_dir.clone(),
        }
    }

    /// Remove and recreate the output and input directories.
    pub async fn prepare_directories(&self) -> Result<(), SupervisorError> {
        for dir in [&self.output_dir, &self.input_dir] {
            reset_directory(dir).await?;
        }
        Ok(())
    }

    /// Reset the working directories and spawn the server.
    ///
    /// The exit status is never checked here: a server that dies right
    /// away shows up as a readiness timeout.
    pub async fn start(&self) -> Result<ServerProcess, SupervisorError> {
        self.prepare_directories().await?;

        // The child runs from `comfy_dir`, so hand it absolute paths.
        let output_dir = absolute(&self.output_dir).await?;
        let input_dir = absolute(&self.input_dir).await?;

        let mut cmd = Command::new(&self.python);
        cmd.arg("main.py")
            .arg("--listen")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string())
            .arg("--output-directory")
            .arg(&output_dir)
            .arg("--input-directory")
            .arg(&input_dir)
            .current_dir(&self.comfy_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: self.python.clone(),
            source,
        })?;

        tracing::info!(
            pid = child.id(),
            host = %self.host,
            port = self.port,
            output_dir = %output_dir.display(),
            "Started ComfyUI server",
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "stderr"));
        }

        Ok(ServerProcess { child })
    }
}

impl ServerProcess {
    /// OS process ID, `None` once the child has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status if the server has already stopped.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kill the server and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to stop ComfyUI server");
        } else {
            tracing::info!("ComfyUI server stopped");
        }
    }
}

async fn reset_directory(dir: &Path) -> Result<(), SupervisorError> {
    let map_err = |source: std::io::Error| SupervisorError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    if tokio::fs::try_exists(dir).await.map_err(map_err)? {
        tokio::fs::remove_dir_all(dir).await.map_err(map_err)?;
    }
    tokio::fs::create_dir_all(dir).await.map_err(map_err)
}

async fn absolute(dir: &Path) -> Result<PathBuf, SupervisorError> {
    tokio::fs::canonicalize(dir)
        .await
        .map_err(|source| SupervisorError::Directory {
            path: dir.to_path_buf(),
            source,
        })
}

/// Relay a child output stream into the log, one line per event.
async fn forward_lines<R: AsyncRead + Unpin>(stream: R, stream_name: &'static str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "comfyui_server", stream = stream_name, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream = stream_name, error = %e, "Stopped reading server output");
                break;
            }
        }
    }
}
