//! LED ring driven through the LED pattern server
//!
//! Signals are queued to a worker task that POSTs them in order. The
//! server answers `202 Accepted` when it switched patterns.

use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{FeedbackSignal, FeedbackSink};

/// Transport-level attempts per signal
const ATTEMPTS: u32 = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Feedback sink posting to an LED server
#[derive(Debug, Clone)]
pub struct LedFeedback {
    tx: mpsc::UnboundedSender<FeedbackSignal>,
}

impl LedFeedback {
    /// Start the worker posting to `origin`
    pub fn spawn(origin: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(client, origin.trim_end_matches('/').to_string(), rx));

        Ok(Self { tx })
    }
}

impl FeedbackSink for LedFeedback {
    fn emit(&self, signal: FeedbackSignal) {
        if self.tx.send(signal).is_err() {
            warn!(%signal, "LED worker gone, dropping feedback");
        }
    }
}

async fn run_worker(
    client: reqwest::Client,
    origin: String,
    mut rx: mpsc::UnboundedReceiver<FeedbackSignal>,
) {
    while let Some(signal) = rx.recv().await {
        let url = format!("{origin}{}", signal.endpoint());
        post_pattern(&client, &url, signal).await;
    }
    debug!("LED worker stopped");
}

async fn post_pattern(client: &reqwest::Client, url: &str, signal: FeedbackSignal) {
    for attempt in 1..=ATTEMPTS {
        match client.post(url).send().await {
            Ok(response) if response.status() == StatusCode::ACCEPTED => {
                debug!(%signal, "LED pattern changed");
                return;
            }
            Ok(response) => {
                warn!(%signal, %url, status = %response.status(), "failed to change LED pattern");
                return;
            }
            Err(e) => {
                warn!(%signal, %url, attempt, error = %e, "failed to change LED pattern");
            }
        }
    }
}
