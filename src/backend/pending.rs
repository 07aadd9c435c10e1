//! Slot holding the notification waiting to be fetched

use std::future::pending;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::protocol::Notification;

/// Latest announced message, shared between the listener and the client
///
/// The listener publishes, the orchestrator side clears after a successful
/// fetch. A newer announcement replaces an older one.
#[derive(Debug, Clone)]
pub struct PendingSlot {
    tx: Arc<watch::Sender<Option<Notification>>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, notification: Notification) {
        debug!(message_id = notification.message_id, "notification pending");
        self.tx.send_replace(Some(notification));
    }

    pub fn current(&self) -> Option<Notification> {
        *self.tx.borrow()
    }

    /// Resolve once a notification is pending (immediately if one is)
    pub async fn wait_available(&self) -> Notification {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(notification) = *rx.borrow_and_update() {
                return notification;
            }
            if rx.changed().await.is_err() {
                // unreachable while `self` holds the sender
                return pending().await;
            }
        }
    }

    /// Clear the slot if it still holds `message_id`
    pub fn clear(&self, message_id: u64) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(n) if n.message_id == message_id => {
                *slot = None;
                true
            }
            _ => false,
        })
    }
}

impl Default for PendingSlot {
    fn default() -> Self {
        Self::new()
    }
}
