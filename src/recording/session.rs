//! Single-use recording session

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::audio::{AudioBuffer, AudioCapture, AudioError, CaptureHandle, RecordedAudio};

/// Errors from a recording session
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("recording already started")]
    AlreadyStarted,

    #[error("no capture to join")]
    NoCapture,

    #[error("capture failed: {0}")]
    Capture(#[from] AudioError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Capturing,
    Stopping,
    Done,
}

/// Owns one capture from start until the finished audio is consumed
pub struct RecordingSession {
    capture: Arc<dyn AudioCapture>,
    device: String,
    phase: Phase,
    handle: Option<Box<dyn CaptureHandle>>,
    recording: Option<RecordedAudio>,
}

impl RecordingSession {
    pub fn new(capture: Arc<dyn AudioCapture>, device: impl Into<String>) -> Self {
        Self {
            capture,
            device: device.into(),
            phase: Phase::Idle,
            handle: None,
            recording: None,
        }
    }

    /// Begin capturing; returns once the capture is running
    pub fn start(&mut self) -> Result<(), RecordingError> {
        if self.phase != Phase::Idle {
            return Err(RecordingError::AlreadyStarted);
        }
        // a failed start still uses up the session
        self.phase = Phase::Done;
        self.handle = Some(self.capture.start_capture(&self.device)?);
        self.phase = Phase::Capturing;
        debug!(device = %self.device, "recording started");
        Ok(())
    }

    /// Ask the capture to end; only the first call has an effect
    pub fn stop(&mut self) {
        if self.phase != Phase::Capturing {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop();
        }
        self.phase = Phase::Stopping;
    }

    /// Wait for the capture to finish
    ///
    /// Stops the capture first if nobody has.
    pub async fn join(&mut self) -> Result<&RecordedAudio, RecordingError> {
        self.stop();
        if let Some(handle) = self.handle.take() {
            self.phase = Phase::Done;
            let recording = handle.finalize().await?;
            info!(
                duration_ms = recording.duration.as_millis() as u64,
                bytes = recording.buffer.len(),
                "recording finished"
            );
            self.recording = Some(recording);
        }
        self.recording.as_ref().ok_or(RecordingError::NoCapture)
    }

    /// Recorded audio, once joined
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.recording.as_ref().map(|r| &r.buffer)
    }

    /// Length of the recording, once joined
    pub fn duration(&self) -> Option<Duration> {
        self.recording.as_ref().map(|r| r.duration)
    }

    pub fn into_recording(self) -> Option<RecordedAudio> {
        self.recording
    }
}
