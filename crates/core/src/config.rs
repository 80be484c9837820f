//! Environment variable helpers shared by the orchestrator configs.
//!
//! Every config type parses through a lookup function rather than
//! reading `std::env` directly, so tests can feed a fixed map while the
//! binaries pass [`env_lookup`].

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Look up a process environment variable, treating unset and
/// non-unicode values alike.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Return the trimmed value of `name`, or `None` when unset or blank.
pub fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Return the value of `name`, falling back to `default`.
pub fn string_or<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).unwrap_or_else(|| default.to_string())
}

/// Parse `name` into `T`, falling back to `default` when unset.
pub fn parse_or<F, T>(
    lookup: &F,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

/// Parse `name` as a whole number of seconds.
pub fn secs_or<F>(lookup: &F, name: &'static str, default_secs: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, name, "a whole number of seconds", default_secs).map(Duration::from_secs)
}

/// Split a comma-separated list, dropping blank entries.
pub fn list_or<F>(lookup: &F, name: &str, default: &[&str]) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
