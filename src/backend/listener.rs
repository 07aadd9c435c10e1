//! Supervised notification listener
//!
//! Keeps one push channel open, publishing every `new_message` frame to the
//! pending slot. Any closure, transport error or undecodable frame ends the
//! session; the listener waits out the reconnect delay, negotiates again and
//! reconnects until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::pending::PendingSlot;
use super::protocol::{Notification, PushMessage};
use super::transport::{PushConnector, TransportError};

/// Handle to a running listener task
pub struct ListenerHandle {
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Spawn the listener task
    pub fn spawn(
        connector: Arc<dyn PushConnector>,
        pending: PendingSlot,
        reconnect_delay: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = Arc::new(AtomicBool::new(true));

        let task_running = Arc::clone(&running);
        let handle = tokio::spawn(async move {
            info!("notification listener started");
            supervise(connector, pending, reconnect_delay, shutdown_rx).await;
            task_running.store(false, Ordering::SeqCst);
            info!("notification listener stopped");
        });

        Self {
            shutdown_tx,
            running,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the task and wait for it to exit
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(?e, "notification listener task failed");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

async fn supervise(
    connector: Arc<dyn PushConnector>,
    pending: PendingSlot,
    reconnect_delay: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            ended = run_session(connector.as_ref(), &pending) => match ended {
                Ok(()) => warn!(
                    delay_secs = reconnect_delay.as_secs(),
                    "push channel closed, reconnecting"
                ),
                Err(e) => warn!(
                    error = %e,
                    delay_secs = reconnect_delay.as_secs(),
                    "push channel failed, reconnecting"
                ),
            },
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = sleep(reconnect_delay) => {}
        }
    }
}

/// One connection; `Ok` when the backend closed it
async fn run_session(
    connector: &dyn PushConnector,
    pending: &PendingSlot,
) -> Result<(), TransportError> {
    let mut channel = connector.connect().await?;
    info!("push channel connected");

    while let Some(frame) = channel.recv().await {
        let text = frame?;
        match serde_json::from_str::<PushMessage>(&text)? {
            PushMessage::NewMessage { id } => {
                info!(message_id = id, "new message announced");
                pending.publish(Notification { message_id: id });
            }
            PushMessage::Unknown => debug!(frame = %text, "ignoring push frame"),
        }
    }

    Ok(())
}
