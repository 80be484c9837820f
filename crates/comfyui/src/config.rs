//! Settings for the local ComfyUI worker, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use canvas_core::config::{env_lookup, list_or, non_empty, parse_or, secs_or, string_or};
use canvas_core::error::ConfigError;

/// Checkpoint the default text-to-image workflow expects.
pub const DEFAULT_CHECKPOINT_URL: &str =
    "https://huggingface.co/stabilityai/stable-diffusion-xl-base-1.0/resolve/main/sd_xl_base_1.0.safetensors";

/// Local orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ComfyConfig {
    /// ComfyUI checkout the server is launched from.
    pub comfy_dir: PathBuf,
    /// Interpreter used to run `main.py`.
    pub python: String,
    pub host: String,
    pub port: u16,
    /// Cleared at startup; results are resolved against it.
    pub output_dir: PathBuf,
    /// Cleared at startup.
    pub input_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_urls: Vec<String>,
    pub workflow_path: PathBuf,
    pub prompt_node: String,
    /// `None` means the last node of the workflow.
    pub output_node: Option<String>,
    pub readiness_timeout: Duration,
    pub generation_timeout: Duration,
}

impl ComfyConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// | Env Var                   | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `COMFYUI_DIR`             | `.`                              |
    /// | `COMFYUI_PYTHON`          | `python`                         |
    /// | `COMFYUI_HOST`            | `127.0.0.1`                      |
    /// | `COMFYUI_PORT`            | `8188`                           |
    /// | `COMFYUI_OUTPUT_DIR`      | `<COMFYUI_DIR>/output`           |
    /// | `COMFYUI_INPUT_DIR`       | `<COMFYUI_DIR>/input`            |
    /// | `COMFYUI_CHECKPOINT_DIR`  | `<COMFYUI_DIR>/models/checkpoints` |
    /// | `COMFYUI_CHECKPOINT_URLS` | SDXL base 1.0                    |
    /// | `WORKFLOW_PATH`           | `workflow_api.json`              |
    /// | `WORKFLOW_PROMPT_NODE`    | `6`                              |
    /// | `WORKFLOW_OUTPUT_NODE`    | last workflow node               |
    /// | `READINESS_TIMEOUT_SECS`  | `60`                             |
    /// | `GENERATION_TIMEOUT_SECS` | `600`                            |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let comfy_dir = PathBuf::from(string_or(&lookup, "COMFYUI_DIR", "."));
        let dir_or = |name: &str, default: &str| {
            non_empty(&lookup, name)
                .map(PathBuf::from)
                .unwrap_or_else(|| comfy_dir.join(default))
        };

        Ok(Self {
            python: string_or(&lookup, "COMFYUI_PYTHON", "python"),
            host: string_or(&lookup, "COMFYUI_HOST", "127.0.0.1"),
            port: parse_or(&lookup, "COMFYUI_PORT", "a port number", 8188)?,
            output_dir: dir_or("COMFYUI_OUTPUT_DIR", "output"),
            input_dir: dir_or("COMFYUI_INPUT_DIR", "input"),
            checkpoint_dir: dir_or("COMFYUI_CHECKPOINT_DIR", "models/checkpoints"),
            checkpoint_urls: list_or(&lookup, "COMFYUI_CHECKPOINT_URLS", &[DEFAULT_CHECKPOINT_URL]),
            workflow_path: PathBuf::from(string_or(&lookup, "WORKFLOW_PATH", "workflow_api.json")),
            prompt_node: string_or(&lookup, "WORKFLOW_PROMPT_NODE", "6"),
            output_node: non_empty(&lookup, "WORKFLOW_OUTPUT_NODE"),
            readiness_timeout: secs_or(&lookup, "READINESS_TIMEOUT_SECS", 60)?,
            generation_timeout: secs_or(&lookup, "GENERATION_TIMEOUT_SECS", 600)?,
            comfy_dir,
        })
    }

    /// HTTP base URL of the local server.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// WebSocket base URL of the local server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}
