//! HTTP transport for the backend REST API
//!
//! Uploads are multipart forms with the recording in a `file` field.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::protocol::{BackendRequest, RequestKind};
use super::transport::{Transport, TransportError, TransportResponse};
use crate::config::BackendConfig;

/// File name the backend expects for uploaded recordings
const UPLOAD_FILE_NAME: &str = "record.wav";

/// Body of the negotiate endpoint
#[derive(Debug, Deserialize)]
struct NegotiateResponse {
    url: String,
}

/// `Transport` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    origin: String,
    api_version: u32,
    device_id: u64,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let origin = config.api_origin.trim_end_matches('/').to_string();
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(TransportError::Url(config.api_origin.clone()));
        }

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            origin,
            api_version: config.api_version,
            device_id: config.device_id,
        })
    }

    fn device_url(&self) -> String {
        format!("{}/v{}/raspis/{}", self.origin, self.api_version, self.device_id)
    }

    /// URL a request kind is sent to
    pub fn url_for(&self, kind: RequestKind) -> String {
        match kind {
            RequestKind::Ping => format!("{}/ping", self.origin),
            RequestKind::Normal => self.device_url(),
            RequestKind::Message => format!("{}/messages", self.device_url()),
            RequestKind::FetchById { message_id } => {
                format!("{}/messages/{message_id}", self.device_url())
            }
        }
    }

    /// Ask the backend where the push channel lives
    pub async fn negotiate_push_url(&self) -> Result<String, TransportError> {
        let url = format!("{}/negotiate", self.device_url());
        let response = self.client.post(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body: NegotiateResponse = response.json().await?;
        debug!(url = %body.url, "negotiated push channel");
        Ok(body.url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &BackendRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(request.kind);
        let builder = match request.kind {
            RequestKind::Ping | RequestKind::FetchById { .. } => self.client.get(&url),
            RequestKind::Normal | RequestKind::Message => {
                let bytes = request
                    .payload
                    .as_ref()
                    .map(|audio| audio.as_bytes().to_vec())
                    .unwrap_or_default();
                let part = Part::bytes(bytes)
                    .file_name(UPLOAD_FILE_NAME)
                    .mime_str("audio/wav")?;
                self.client.post(&url).multipart(Form::new().part("file", part))
            }
        };

        debug!(kind = %request.kind, attempt = request.attempt, %url, "sending request");
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse { status, body })
    }
}
