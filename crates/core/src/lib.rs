//! Shared building blocks for the Canvas orchestrators.
//!
//! Holds the workflow recipe model submitted to ComfyUI, the
//! environment-driven configuration helpers, and the error types both
//! the local and the remote orchestrator surface to their callers.

pub mod config;
pub mod error;
pub mod workflow;
