#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use canvas_comfyui::api::ComfyUIApiError;
use canvas_comfyui::backend::{ComfyBackend, EventSource};
use canvas_comfyui::client::ComfyUIClientError;
use canvas_comfyui::readiness::ProbeError;
use canvas_core::workflow::{WorkflowGraph, WorkflowRecipe};
use tokio::time::Instant;

/// Workflow with keys inserted as `3`, `6`, `9`; `6` is the prompt node.
pub const WORKFLOW: &str = r#"{
    "3": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 20}},
    "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "", "clip": ["4", 1]}},
    "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
}"#;

pub fn recipe() -> WorkflowRecipe {
    let graph = WorkflowGraph::from_json_str(WORKFLOW).unwrap();
    WorkflowRecipe::new(graph, "6", None).unwrap()
}

/// An `executed` frame for `node` listing `files` as output images.
pub fn executed(node: &str, prompt_id: &str, files: &[&str]) -> String {
    let images: Vec<_> = files
        .iter()
        .map(|f| serde_json::json!({"filename": f, "subfolder": "", "type": "output"}))
        .collect();
    serde_json::json!({
        "type": "executed",
        "data": {"node": node, "output": {"images": images}, "prompt_id": prompt_id},
    })
    .to_string()
}

pub fn execution_error(prompt_id: &str, message: &str) -> String {
    serde_json::json!({
        "type": "execution_error",
        "data": {
            "prompt_id": prompt_id,
            "node_id": "3",
            "exception_message": message,
            "exception_type": "torch.OutOfMemoryError",
        },
    })
    .to_string()
}

pub fn progress(value: i32, max: i32) -> String {
    serde_json::json!({"type": "progress", "data": {"value": value, "max": max}}).to_string()
}

// ---------------------------------------------------------------------------
// In-memory event stream
// ---------------------------------------------------------------------------

/// Replays canned frames. Once drained it either reports the stream as
/// closed or, with `hold_open`, never yields again.
pub struct FakeEvents {
    client_id: String,
    frames: VecDeque<String>,
    hold_open: bool,
    closed: Arc<AtomicBool>,
}

impl FakeEvents {
    pub fn new(frames: Vec<String>) -> Self {
        Self {
            client_id: "fake-client".into(),
            frames: frames.into(),
            hold_open: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn next_frame(&mut self) -> Option<Result<String, ComfyUIClientError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// In-memory ComfyUI server
// ---------------------------------------------------------------------------

/// Scriptable stand-in for a ComfyUI server.
pub struct FakeBackend {
    /// Probes succeed from this instant on; `None` means never.
    pub ready_at: Option<Instant>,
    /// Probes fail hard with this message instead.
    pub probe_failure: Option<String>,
    /// Readiness checks never resolve, like a server that accepts but never answers.
    pub hangs: bool,
    pub probes: AtomicU32,
    /// Frames served on the next `open_events`.
    pub frames: Mutex<Vec<String>>,
    pub hold_open: bool,
    pub prompt_id: String,
    /// Make `submit` fail with this HTTP status.
    pub submit_status: Option<u16>,
    pub submitted: Mutex<Vec<(serde_json::Value, String)>>,
    pub cancelled: Mutex<Vec<String>>,
    pub events_closed: Arc<AtomicBool>,
}

impl FakeBackend {
    pub fn ready() -> Self {
        Self::ready_at(Some(Instant::now()))
    }

    pub fn ready_at(ready_at: Option<Instant>) -> Self {
        Self {
            ready_at,
            probe_failure: None,
            hangs: false,
            probes: AtomicU32::new(0),
            frames: Mutex::new(Vec::new()),
            hold_open: false,
            prompt_id: "prompt-1".into(),
            submit_status: None,
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            events_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_frames(self, frames: Vec<String>) -> Self {
        *self.frames.lock().unwrap() = frames;
        self
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComfyBackend for FakeBackend {
    type Events = FakeEvents;

    async fn probe(&self) -> Result<(), ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.hangs {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.probe_failure {
            return Err(ProbeError::Failed(message.clone()));
        }
        match self.ready_at {
            Some(at) if Instant::now() >= at => Ok(()),
            _ => Err(ProbeError::NotReady("connection refused".into())),
        }
    }

    async fn open_events(&self) -> Result<FakeEvents, ComfyUIClientError> {
        let frames = std::mem::take(&mut *self.frames.lock().unwrap());
        let mut events = FakeEvents::new(frames);
        events.hold_open = self.hold_open;
        events.closed = Arc::clone(&self.events_closed);
        Ok(events)
    }

    async fn submit(
        &self,
        graph: &WorkflowGraph,
        client_id: &str,
    ) -> Result<String, ComfyUIApiError> {
        if let Some(status) = self.submit_status {
            return Err(ComfyUIApiError::ApiError {
                status,
                body: "invalid prompt".into(),
            });
        }
        self.submitted
            .lock()
            .unwrap()
            .push((serde_json::to_value(graph).unwrap(), client_id.to_string()));
        Ok(self.prompt_id.clone())
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP test server
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral localhost port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A localhost address that accepts connections and never replies.
pub async fn silent_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// A localhost address nothing is listening on.
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
