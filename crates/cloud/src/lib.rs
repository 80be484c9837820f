//! Remote image generation through the Replicate predictions API.
//!
//! - [`config`] - credentials and model reference from the environment
//! - [`prediction`] - wire types and the per-request [`prediction::RemoteJob`]
//! - [`api`] - REST client implementing [`api::PredictionBackend`]
//! - [`poller`] - submit a prediction and poll it to a terminal status

pub mod api;
pub mod config;
pub mod poller;
pub mod prediction;
