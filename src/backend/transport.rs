//! Seams between the backend client and the network

use std::time::Duration;

use async_trait::async_trait;

use super::protocol::BackendRequest;

/// Errors from the request transport and push channel
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push channel failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid backend URL: {0}")]
    Url(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Raw answer to one request attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single request attempt
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &BackendRequest) -> Result<TransportResponse, TransportError>;
}

/// Opens the push notification channel
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError>;
}

/// An open push channel
#[async_trait]
pub trait PushChannel: Send {
    /// Next text frame; `None` once the channel has closed
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}
