//! WebSocket client for a ComfyUI event stream.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL. Call
//! [`ComfyUIClient::connect`] to open a live [`ComfyUIConnection`], which
//! yields text frames through the [`EventSource`] trait.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::backend::EventSource;

/// Configuration handle for a ComfyUI WebSocket endpoint.
#[derive(Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Unique client ID sent during the WebSocket handshake. Workflows
    /// submitted with this ID report their events on this connection.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket base URL (e.g. `ws://127.0.0.1:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a
    /// query parameter so that ComfyUI can address messages back to
    /// this specific client.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id,
            ws_stream,
        })
    }
}

#[async_trait]
impl EventSource for ComfyUIConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn next_frame(&mut self) -> Option<Result<String, ComfyUIClientError>> {
        while let Some(msg_result) = self.ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(_)) => {
                    // ComfyUI sends binary frames for sampler previews.
                    tracing::trace!(client_id = %self.client_id, "Ignoring binary preview frame");
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Handled automatically by tungstenite.
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(client_id = %self.client_id, ?frame, "ComfyUI WebSocket closed");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(ComfyUIClientError::Protocol(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(client_id = %self.client_id, error = %e, "WebSocket close failed");
        }
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
