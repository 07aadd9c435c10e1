//! Visual status feedback
//!
//! Feedback is fire-and-forget: `emit` never blocks and never reports
//! failure to the caller. Sinks log whatever goes wrong.

mod led;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use led::LedFeedback;

/// Status shown on the LED ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    /// Ready and waiting for input
    SystemOn,
    /// Starting up, backend not reachable yet
    SystemSetup,
    /// Shutting down
    SystemOff,
    /// Microphone is recording
    AudioRecording,
    /// Speaker is playing a reply or message
    AudioPlaying,
    /// Waiting for the backend to answer
    ApiProcessing,
    ApiSuccess,
    ApiFail,
    /// Uploading a message
    ApiPostingMessage,
    /// A message is waiting to be played
    Notifying,
}

impl FeedbackSignal {
    /// LED server path that shows this status
    pub fn endpoint(&self) -> &'static str {
        match self {
            FeedbackSignal::SystemOn => "/system/on",
            FeedbackSignal::SystemSetup => "/system/setup",
            FeedbackSignal::SystemOff => "/system/turn_off",
            FeedbackSignal::AudioRecording => "/audio/listening",
            FeedbackSignal::AudioPlaying => "/audio/res-success",
            FeedbackSignal::ApiProcessing => "/audio/thinking",
            FeedbackSignal::ApiSuccess => "/audio/res-success",
            FeedbackSignal::ApiFail => "/audio/res-fail",
            FeedbackSignal::ApiPostingMessage => "/audio/uploading",
            FeedbackSignal::Notifying => "/audio/receive",
        }
    }
}

impl std::fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackSignal::SystemOn => write!(f, "SYSTEM_ON"),
            FeedbackSignal::SystemSetup => write!(f, "SYSTEM_SETUP"),
            FeedbackSignal::SystemOff => write!(f, "SYSTEM_OFF"),
            FeedbackSignal::AudioRecording => write!(f, "AUDIO_RECORDING"),
            FeedbackSignal::AudioPlaying => write!(f, "AUDIO_PLAYING"),
            FeedbackSignal::ApiProcessing => write!(f, "API_PROCESSING"),
            FeedbackSignal::ApiSuccess => write!(f, "API_SUCCESS"),
            FeedbackSignal::ApiFail => write!(f, "API_FAIL"),
            FeedbackSignal::ApiPostingMessage => write!(f, "API_POSTING_MESSAGE"),
            FeedbackSignal::Notifying => write!(f, "NOTIFYING"),
        }
    }
}

/// Destination for feedback signals
pub trait FeedbackSink: Send + Sync {
    /// Try to show `signal`; returns immediately
    fn emit(&self, signal: FeedbackSignal);
}

/// Sink used when no LED server is configured
#[derive(Debug, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn emit(&self, signal: FeedbackSignal) {
        info!(%signal, "feedback");
    }
}
