//! Backend client with a single retry policy
//!
//! Every request except the startup probe is bounded: at most `retries`
//! attempts, each limited by the request timeout, with a fixed delay in
//! between. `connect` keeps probing until the backend answers.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use super::listener::ListenerHandle;
use super::pending::PendingSlot;
use super::protocol::{BackendRequest, BackendResponse, Notification, RequestKind};
use super::transport::{PushConnector, Transport, TransportError};
use crate::audio::AudioBuffer;
use crate::config::BackendConfig;

/// Client for the backend REST API and its push channel
pub struct BackendClient {
    transport: Arc<dyn Transport>,
    push: Arc<dyn PushConnector>,
    config: BackendConfig,
    pending: PendingSlot,
    listener: Option<ListenerHandle>,
}

impl BackendClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        push: Arc<dyn PushConnector>,
        config: &BackendConfig,
    ) -> Self {
        Self {
            transport,
            push,
            config: config.clone(),
            pending: PendingSlot::new(),
            listener: None,
        }
    }

    /// Probe until the backend answers; returns the number of probes
    pub async fn connect(&self) -> u32 {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let probe = BackendRequest {
                kind: RequestKind::Ping,
                payload: None,
                attempt,
            };
            match self.attempt(&probe).await {
                Ok(_) => {
                    info!(attempts = attempt, "backend reachable");
                    return attempt;
                }
                Err(e) => warn!(
                    attempt,
                    error = %e,
                    retry_in_secs = self.config.ping_interval().as_secs(),
                    "backend unreachable"
                ),
            }
            sleep(self.config.ping_interval()).await;
        }
    }

    /// Send a request with bounded retries
    pub async fn request(
        &self,
        kind: RequestKind,
        payload: Option<AudioBuffer>,
    ) -> BackendResponse {
        if kind.is_upload() && payload.as_ref().map_or(true, AudioBuffer::is_empty) {
            warn!(%kind, "refusing upload without audio");
            return BackendResponse::InvalidInput;
        }

        let retries = self.config.retries.max(1);
        let mut request = BackendRequest {
            kind,
            payload,
            attempt: 0,
        };

        for attempt in 1..=retries {
            request.attempt = attempt;
            match self.attempt(&request).await {
                Ok(body) => {
                    info!(%kind, attempt, bytes = body.len(), "request succeeded");
                    return BackendResponse::Success(AudioBuffer::new(body));
                }
                Err(e) => {
                    warn!(%kind, attempt, retries, error = %e, "request attempt failed");
                    if attempt < retries {
                        sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        warn!(%kind, retries, "backend unavailable");
        BackendResponse::Unavailable
    }

    async fn attempt(&self, request: &BackendRequest) -> Result<Vec<u8>, TransportError> {
        let limit = self.config.request_timeout();
        let response = timeout(limit, self.transport.send(request))
            .await
            .map_err(|_| TransportError::Timeout(limit))??;

        if response.is_success() {
            Ok(response.body)
        } else {
            Err(TransportError::Status(response.status))
        }
    }

    /// Start the push listener; no-op while one is running
    pub fn start_notification_listener(&mut self) {
        if self.is_listening() {
            warn!("notification listener already running");
            return;
        }
        self.listener = Some(ListenerHandle::spawn(
            Arc::clone(&self.push),
            self.pending.clone(),
            self.config.reconnect_delay(),
        ));
    }

    /// Stop the push listener and wait for it to exit
    pub async fn stop_notification_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop().await;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(ListenerHandle::is_running)
    }

    /// Resolve once a notification is pending
    pub async fn wait_for_notification(&self) -> Notification {
        self.pending.wait_available().await
    }

    pub fn pending_notification(&self) -> Option<Notification> {
        self.pending.current()
    }

    /// Download the pending message, if any
    ///
    /// The notification is only cleared when the download succeeds.
    pub async fn fetch_pending_message(&self) -> Option<BackendResponse> {
        let Notification { message_id } = self.pending_notification()?;

        let response = self
            .request(RequestKind::FetchById { message_id }, None)
            .await;
        if response.is_success() {
            self.pending.clear(message_id);
        }
        Some(response)
    }
}
