//! ALSA capture and playback through `arecord` and `aplay`
//!
//! Capture reads raw little-endian 16-bit PCM from `arecord` in fixed-size
//! chunks and wraps it into a WAV container once stopped. Playback pipes a
//! WAV buffer into `aplay`.

use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AudioBuffer, AudioCapture, AudioError, AudioPlayback, CaptureHandle, PlaybackHandle,
    RecordedAudio,
};
use crate::config::AudioConfig;

/// Bytes read from `arecord` per chunk
const CHUNK_BYTES: usize = 8192;

/// Records with `arecord`
#[derive(Debug, Clone)]
pub struct AlsaCapture {
    sample_rate: u32,
    channels: u16,
}

impl AlsaCapture {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
        }
    }
}

impl AudioCapture for AlsaCapture {
    fn start_capture(&self, device: &str) -> Result<Box<dyn CaptureHandle>, AudioError> {
        let mut child = Command::new("arecord")
            .args(["-q", "-D", device, "-f", "S16_LE", "-t", "raw"])
            .arg("-r")
            .arg(self.sample_rate.to_string())
            .arg("-c")
            .arg(self.channels.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(device, e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unavailable(device, "no stdout from arecord".to_string()))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let reader = tokio::spawn(read_pcm(stdout, stop_rx));

        info!(device, sample_rate = self.sample_rate, channels = self.channels, "capture started");

        Ok(Box::new(AlsaCaptureHandle {
            device: device.to_string(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            child,
            stop_tx: Some(stop_tx),
            reader,
        }))
    }
}

struct AlsaCaptureHandle {
    device: String,
    sample_rate: u32,
    channels: u16,
    child: Child,
    stop_tx: Option<oneshot::Sender<()>>,
    reader: JoinHandle<std::io::Result<(Vec<u8>, bool)>>,
}

#[async_trait]
impl CaptureHandle for AlsaCaptureHandle {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!(device = %self.device, "capture stop requested");
            let _ = tx.send(());
        }
    }

    async fn finalize(self: Box<Self>) -> Result<RecordedAudio, AudioError> {
        let AlsaCaptureHandle {
            device,
            sample_rate,
            channels,
            mut child,
            reader,
            ..
        } = *self;

        let (pcm, stopped) = reader.await.map_err(std::io::Error::other)??;

        let _ = child.start_kill();
        let status = child.wait().await?;
        if !stopped && !status.success() {
            return Err(unavailable(&device, format!("arecord exited with {status}")));
        }

        let recording = encode_wav(&pcm, sample_rate, channels)?;
        info!(
            %device,
            duration_ms = recording.duration.as_millis() as u64,
            bytes = recording.buffer.len(),
            "capture finalized"
        );
        Ok(recording)
    }
}

/// Read PCM until asked to stop or the stream ends.
///
/// Returns the samples and whether the stop was requested.
async fn read_pcm(
    mut stdout: ChildStdout,
    mut stop_rx: oneshot::Receiver<()>,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut pcm = Vec::new();
    let mut chunk = vec![0u8; CHUNK_BYTES];

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => return Ok((pcm, true)),
            read = stdout.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    return Ok((pcm, false));
                }
                pcm.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Wrap raw little-endian i16 PCM into a WAV buffer
pub(crate) fn encode_wav(
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<RecordedAudio, AudioError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let frame_bytes = 2 * usize::from(channels.max(1));
    let whole = pcm.len() - pcm.len() % frame_bytes;
    let frames = whole / frame_bytes;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in pcm[..whole].chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
        writer.finalize()?;
    }

    let duration = if sample_rate == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
    };

    Ok(RecordedAudio {
        buffer: AudioBuffer::new(cursor.into_inner()),
        duration,
    })
}

/// Plays WAV buffers with `aplay`
#[derive(Debug, Clone)]
pub struct AlsaPlayback {
    device: String,
}

impl AlsaPlayback {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device: config.speaker_device.clone(),
        }
    }
}

impl AudioPlayback for AlsaPlayback {
    fn play(&self, audio: &AudioBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        let mut child = Command::new("aplay")
            .args(["-q", "-D", self.device.as_str(), "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(&self.device, e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| unavailable(&self.device, "no stdin for aplay".to_string()))?;

        let bytes = audio.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&bytes).await?;
            stdin.shutdown().await
        });

        debug!(device = %self.device, bytes = audio.len(), "playback started");

        Ok(Box::new(AlsaPlaybackHandle {
            device: self.device.clone(),
            child,
            writer: Some(writer),
            stopped: false,
        }))
    }
}

struct AlsaPlaybackHandle {
    device: String,
    child: Child,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stopped: bool,
}

#[async_trait]
impl PlaybackHandle for AlsaPlaybackHandle {
    fn stop(&mut self) {
        if !self.stopped {
            debug!(device = %self.device, "playback stop requested");
            self.stopped = true;
            let _ = self.child.start_kill();
        }
    }

    async fn join(&mut self) -> Result<(), AudioError> {
        if let Some(writer) = self.writer.as_mut() {
            let written = writer.await.map_err(std::io::Error::other)?;
            self.writer = None;
            if let Err(e) = written {
                if !self.stopped {
                    warn!(device = %self.device, error = %e, "failed to feed aplay");
                }
            }
        }

        let status = self.child.wait().await?;
        if !self.stopped && !status.success() {
            return Err(unavailable(&self.device, format!("aplay exited with {status}")));
        }
        Ok(())
    }
}

fn unavailable(device: &str, reason: String) -> AudioError {
    AudioError::DeviceUnavailable {
        device: device.to_string(),
        reason,
    }
}
