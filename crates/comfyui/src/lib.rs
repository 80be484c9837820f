//! ComfyUI orchestration for a locally spawned generation server.
//!
//! Covers the whole lifecycle of a local job: launching the server
//! process, waiting for it to accept requests, downloading model
//! checkpoints, submitting a workflow with the user's prompt, and
//! watching the WebSocket event stream until the output node has written
//! its image.

pub mod api;
pub mod assets;
pub mod backend;
pub mod client;
pub mod config;
pub mod listener;
pub mod messages;
pub mod orchestrator;
pub mod readiness;
pub mod supervisor;
