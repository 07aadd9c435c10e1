//! Backend request and push message definitions
//!
//! Requests go out over HTTP; push messages arrive as JSON text frames on
//! the notification channel.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

/// What a backend request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Reachability probe
    Ping,
    /// Upload a question, the reply audio comes back in the body
    Normal,
    /// Upload a message for the other side
    Message,
    /// Download a message announced on the push channel
    FetchById { message_id: u64 },
}

impl RequestKind {
    /// Whether the request carries a recording
    pub fn is_upload(&self) -> bool {
        matches!(self, RequestKind::Normal | RequestKind::Message)
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Ping => write!(f, "PING"),
            RequestKind::Normal => write!(f, "NORMAL"),
            RequestKind::Message => write!(f, "MESSAGE"),
            RequestKind::FetchById { message_id } => write!(f, "FETCH({message_id})"),
        }
    }
}

/// One attempt at a backend request
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub kind: RequestKind,
    pub payload: Option<AudioBuffer>,
    /// 1-based attempt number
    pub attempt: u32,
}

/// Outcome of a backend request after retries
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// The backend accepted the request; the body may be empty
    Success(AudioBuffer),
    /// Every attempt failed
    Unavailable,
    /// The request could not be sent as given
    InvalidInput,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendResponse::Success(_))
    }
}

/// A message waiting on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub message_id: u64,
}

/// Frames sent by the backend on the push channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// A new message is waiting
    NewMessage { id: u64 },
    /// Anything else the backend may send
    #[serde(other)]
    Unknown,
}

/// First frame sent after connecting to the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterMessage {
    pub action: &'static str,
    #[serde(rename = "clientId")]
    pub client_id: u64,
}

impl RegisterMessage {
    pub fn new(client_id: u64) -> Self {
        Self {
            action: "register",
            client_id,
        }
    }
}
