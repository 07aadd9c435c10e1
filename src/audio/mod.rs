//! Audio collaborators: capture, playback and voice cues
//!
//! The orchestrator only talks to the traits in this module. The ALSA
//! implementations drive `arecord`/`aplay` child processes.

mod alsa;
mod cues;

use std::time::Duration;

use async_trait::async_trait;

pub use alsa::{AlsaCapture, AlsaPlayback};
pub use cues::{Cue, CueSource, FileCues};

/// WAV-encoded audio held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioBuffer(Vec<u8>);

impl AudioBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub buffer: AudioBuffer,
    pub duration: Duration,
}

/// Errors reported by audio collaborators
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio device {device:?} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("audio I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode WAV: {0}")]
    Encode(#[from] hound::Error),

    #[error("cue {cue} could not be loaded: {reason}")]
    CueMissing { cue: Cue, reason: String },
}

/// Something that can record from a microphone
pub trait AudioCapture: Send + Sync {
    /// Begin capturing from `device`; returns as soon as capture is running
    fn start_capture(&self, device: &str) -> Result<Box<dyn CaptureHandle>, AudioError>;
}

/// A capture in progress
#[async_trait]
pub trait CaptureHandle: Send {
    /// Ask the capture to end at its next chunk boundary
    fn stop(&mut self);

    /// Wait for the capture to end and return the finished recording
    async fn finalize(self: Box<Self>) -> Result<RecordedAudio, AudioError>;
}

/// Something that can play audio through a speaker
pub trait AudioPlayback: Send + Sync {
    /// Begin playing `audio`; returns as soon as playback is running
    fn play(&self, audio: &AudioBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError>;
}

/// A playback in progress
#[async_trait]
pub trait PlaybackHandle: Send {
    /// Cut playback short
    fn stop(&mut self);

    /// Wait until playback has ended; dropping the wait leaves it playing
    async fn join(&mut self) -> Result<(), AudioError>;
}
