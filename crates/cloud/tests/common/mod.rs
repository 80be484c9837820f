#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use canvas_cloud::api::{ApiError, PredictionBackend};
use canvas_cloud::config::ModelRef;
use canvas_cloud::prediction::Prediction;
use serde_json::{json, Value};

pub const STATUS_URL: &str = "https://api.example/v1/predictions/abc";
pub const CANCEL_URL: &str = "https://api.example/v1/predictions/abc/cancel";

pub fn model() -> ModelRef {
    "acme/canvas:v1".parse().unwrap()
}

pub fn created() -> Value {
    json!({
        "id": "abc",
        "status": "starting",
        "urls": {"get": STATUS_URL, "cancel": CANCEL_URL},
    })
}

pub fn status(status: &str) -> Value {
    json!({"id": "abc", "status": status})
}

// ---------------------------------------------------------------------------
// Scripted predictions backend
// ---------------------------------------------------------------------------

/// Answers `create` with a fixed body and `get` with scripted bodies in
/// order; once the script runs out every `get` reports `processing`.
pub struct ScriptedPredictions {
    pub create_response: Value,
    pub statuses: Mutex<VecDeque<Value>>,
    pub created: Mutex<Vec<(String, String)>>,
    pub gets: Mutex<Vec<String>>,
    pub cancels: Mutex<Vec<String>>,
}

impl ScriptedPredictions {
    pub fn new(statuses: Vec<Value>) -> Self {
        Self {
            create_response: created(),
            statuses: Mutex::new(statuses.into()),
            created: Mutex::new(Vec::new()),
            gets: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        }
    }

    pub fn get_count(&self) -> usize {
        self.gets.lock().unwrap().len()
    }
}

#[async_trait]
impl PredictionBackend for ScriptedPredictions {
    async fn create(&self, version: &str, prompt: &str) -> Result<Prediction, ApiError> {
        self.created
            .lock()
            .unwrap()
            .push((version.to_string(), prompt.to_string()));
        Ok(serde_json::from_value(self.create_response.clone()).unwrap())
    }

    async fn get(&self, url: &str) -> Result<Prediction, ApiError> {
        self.gets.lock().unwrap().push(url.to_string());
        let body = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| status("processing"));
        Ok(serde_json::from_value(body).unwrap())
    }

    async fn cancel(&self, url: &str) -> Result<(), ApiError> {
        self.cancels.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP test server
// ---------------------------------------------------------------------------

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
