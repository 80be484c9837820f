//! Settings for the hosted prediction client, read from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use canvas_core::config::{env_lookup, non_empty, secs_or, string_or};
use canvas_core::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.replicate.com";

const TOKEN_VAR: &str = "REPLICATE_API_TOKEN";
const ENDPOINT_VAR: &str = "MODEL_ENDPOINT";

/// A deployed model version, written `owner/name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: String,
}

impl FromStr for ModelRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("...") {
            return Err("still contains the `...` placeholder".into());
        }
        let (model, version) = s
            .split_once(':')
            .ok_or_else(|| "expected `owner/name:version`, no `:version` found".to_string())?;
        if version.is_empty() || version.contains(':') {
            return Err("the version after `:` must be a single non-empty id".into());
        }
        let (owner, name) = model
            .split_once('/')
            .ok_or_else(|| "expected `owner/name` before `:`".to_string())?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err("expected `owner/name` before `:`".into());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.name, self.version)
    }
}

/// Remote orchestrator configuration.
#[derive(Clone)]
pub struct RemoteConfig {
    pub api_token: String,
    pub model: ModelRef,
    /// Base URL, without the `/v1` suffix.
    pub api_url: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

// The token stays out of debug output.
impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_token", &"<redacted>")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// | Env Var               | Default                     |
    /// |-----------------------|-----------------------------|
    /// | `REPLICATE_API_TOKEN` | required                    |
    /// | `MODEL_ENDPOINT`      | required, `owner/name:version` |
    /// | `REPLICATE_API_URL`   | `https://api.replicate.com` |
    /// | `POLL_INTERVAL_SECS`  | `3`                         |
    /// | `POLL_TIMEOUT_SECS`   | `600`                       |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = non_empty(&lookup, TOKEN_VAR).ok_or(ConfigError::Missing {
            name: TOKEN_VAR,
            hint: "set the Replicate API token",
        })?;

        let endpoint = non_empty(&lookup, ENDPOINT_VAR).ok_or(ConfigError::Missing {
            name: ENDPOINT_VAR,
            hint: "set it to the deployed model as `owner/name:version`",
        })?;
        let model = endpoint
            .parse::<ModelRef>()
            .map_err(|reason| ConfigError::Malformed {
                name: ENDPOINT_VAR,
                reason,
            })?;

        Ok(Self {
            api_token,
            model,
            api_url: string_or(&lookup, "REPLICATE_API_URL", DEFAULT_API_URL),
            poll_interval: secs_or(&lookup, "POLL_INTERVAL_SECS", 3)?,
            poll_timeout: secs_or(&lookup, "POLL_TIMEOUT_SECS", 600)?,
        })
    }
}
