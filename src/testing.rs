//! Scripted fakes for the collaborators the orchestrator talks to

use std::collections::VecDeque;
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::audio::{
    AudioBuffer, AudioCapture, AudioError, AudioPlayback, CaptureHandle, Cue, CueSource,
    PlaybackHandle, RecordedAudio,
};
use crate::backend::{
    BackendRequest, PushChannel, PushConnector, Transport, TransportError, TransportResponse,
};
use crate::button::{ButtonError, ButtonId, ButtonSignal};
use crate::feedback::{FeedbackSignal, FeedbackSink};

/// Button levels set directly by a test
#[derive(Debug, Clone, Default)]
pub struct ScriptedButtons {
    inner: Arc<ButtonLevels>,
}

#[derive(Debug, Default)]
struct ButtonLevels {
    main: AtomicBool,
    sub: AtomicBool,
    failing: AtomicBool,
}

impl ScriptedButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> Arc<dyn ButtonSignal> {
        Arc::new(self.clone())
    }

    pub fn press(&self, button: ButtonId) {
        self.level(button).store(true, Ordering::SeqCst);
    }

    pub fn release(&self, button: ButtonId) {
        self.level(button).store(false, Ordering::SeqCst);
    }

    /// Make every read fail until turned off again
    pub fn fail_reads(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    fn level(&self, button: ButtonId) -> &AtomicBool {
        match button {
            ButtonId::Main => &self.inner.main,
            ButtonId::Sub => &self.inner.sub,
        }
    }
}

impl ButtonSignal for ScriptedButtons {
    fn is_pressed(&self, button: ButtonId) -> Result<bool, ButtonError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(ButtonError::InvalidLevel {
                pin: 0,
                value: "scripted failure".to_string(),
            });
        }
        Ok(self.level(button).load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(u16, Vec<u8>),
    Hang,
}

/// Transport answering from a script, then with a fixed fallback
#[derive(Debug)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<BackendRequest>>,
}

impl FakeTransport {
    pub fn answering(status: u16, body: &[u8]) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Reply::Respond(status, body.to_vec()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer for the next unanswered call
    pub fn script(&self, status: u16, body: &[u8]) {
        self.script
            .lock()
            .unwrap()
            .push_back(Reply::Respond(status, body.to_vec()));
    }

    /// Let the next unanswered call never complete
    pub fn hang_next(&self) {
        self.script.lock().unwrap().push_back(Reply::Hang);
    }

    pub fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &BackendRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Respond(status, body) => Ok(TransportResponse { status, body }),
            Reply::Hang => pending().await,
        }
    }
}

/// What one push connection does
#[derive(Debug, Clone)]
pub enum FakeSession {
    Refuse,
    Frames { frames: Vec<String>, close: bool },
    /// Connects, stays silent, then fails as a dead link does
    Stall(Duration),
}

impl FakeSession {
    /// Deliver `frames`, then stay open
    pub fn open(frames: &[&str]) -> Self {
        Self::Frames {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            close: false,
        }
    }

    /// Deliver `frames`, then close
    pub fn closing(frames: &[&str]) -> Self {
        Self::Frames {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            close: true,
        }
    }

    pub fn refuse() -> Self {
        Self::Refuse
    }

    pub fn stalling(after: Duration) -> Self {
        Self::Stall(after)
    }
}

/// Push connector replaying scripted sessions; unscripted ones stay silent
#[derive(Debug, Default)]
pub struct FakePush {
    sessions: Mutex<VecDeque<FakeSession>>,
    connects: AtomicUsize,
}

impl FakePush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, session: FakeSession) {
        self.sessions.lock().unwrap().push_back(session);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushConnector for FakePush {
    async fn connect(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FakeSession::open(&[]));

        match session {
            FakeSession::Refuse => Err(TransportError::Status(503)),
            FakeSession::Frames { frames, close } => Ok(Box::new(FakeChannel {
                frames: frames.into(),
                close,
            })),
            FakeSession::Stall(after) => Ok(Box::new(StalledChannel { after })),
        }
    }
}

struct FakeChannel {
    frames: VecDeque<String>,
    close: bool,
}

#[async_trait]
impl PushChannel for FakeChannel {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        if self.close {
            return None;
        }
        pending().await
    }
}

struct StalledChannel {
    after: Duration,
}

#[async_trait]
impl PushChannel for StalledChannel {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        tokio::time::sleep(self.after).await;
        Some(Err(TransportError::Timeout(self.after)))
    }
}

/// Capture whose duration is the time between start and stop
#[derive(Debug, Default)]
pub struct FakeCapture {
    devices: Mutex<Vec<String>>,
    stops: Arc<AtomicUsize>,
    fail_start: AtomicBool,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Devices passed to every started capture
    pub fn devices(&self) -> Vec<String> {
        self.devices.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioCapture for FakeCapture {
    fn start_capture(&self, device: &str) -> Result<Box<dyn CaptureHandle>, AudioError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable {
                device: device.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.devices.lock().unwrap().push(device.to_string());
        Ok(Box::new(FakeCaptureHandle {
            started: Instant::now(),
            stopped: None,
            stops: Arc::clone(&self.stops),
        }))
    }
}

struct FakeCaptureHandle {
    started: Instant,
    stopped: Option<Instant>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl CaptureHandle for FakeCaptureHandle {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.get_or_insert_with(Instant::now);
    }

    async fn finalize(self: Box<Self>) -> Result<RecordedAudio, AudioError> {
        let end = self.stopped.unwrap_or_else(Instant::now);
        Ok(RecordedAudio {
            buffer: AudioBuffer::new(b"RIFF-recording".to_vec()),
            duration: end - self.started,
        })
    }
}

/// Playback that records what it was given
#[derive(Debug, Default)]
pub struct FakePlayback {
    played: Mutex<Vec<AudioBuffer>>,
    lengths: Mutex<Vec<(Vec<u8>, Duration)>>,
}

impl FakePlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make playback of `audio` last `length`; everything else ends at once
    pub fn lasting(&self, audio: &[u8], length: Duration) {
        self.lengths.lock().unwrap().push((audio.to_vec(), length));
    }

    /// Everything played so far, decoded as text
    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|audio| String::from_utf8_lossy(audio.as_bytes()).to_string())
            .collect()
    }
}

impl AudioPlayback for FakePlayback {
    fn play(&self, audio: &AudioBuffer) -> Result<Box<dyn PlaybackHandle>, AudioError> {
        self.played.lock().unwrap().push(audio.clone());
        let length = self
            .lengths
            .lock()
            .unwrap()
            .iter()
            .find(|(bytes, _)| bytes.as_slice() == audio.as_bytes())
            .map(|(_, length)| *length)
            .unwrap_or_default();
        Ok(Box::new(FakePlaybackHandle {
            ends_at: Instant::now() + length,
            stopped: false,
        }))
    }
}

struct FakePlaybackHandle {
    ends_at: Instant,
    stopped: bool,
}

#[async_trait]
impl PlaybackHandle for FakePlaybackHandle {
    fn stop(&mut self) {
        self.stopped = true;
    }

    async fn join(&mut self) -> Result<(), AudioError> {
        if !self.stopped {
            tokio::time::sleep_until(self.ends_at).await;
        }
        Ok(())
    }
}

/// Cues whose audio is their own name
#[derive(Debug, Default)]
pub struct FakeCues;

#[async_trait]
impl CueSource for FakeCues {
    async fn load(&self, cue: Cue) -> Result<AudioBuffer, AudioError> {
        Ok(AudioBuffer::new(cue.to_string().into_bytes()))
    }
}

/// Feedback sink remembering every signal
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    signals: Mutex<Vec<FeedbackSignal>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<FeedbackSignal> {
        self.signals.lock().unwrap().clone()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn emit(&self, signal: FeedbackSignal) {
        self.signals.lock().unwrap().push(signal);
    }
}

/// A request seen by `serve_http`
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub body: Vec<u8>,
}

/// Answer `n` HTTP requests with `status` and `body`
pub async fn serve_http(
    listener: TcpListener,
    status: u16,
    body: Vec<u8>,
    n: usize,
) -> Vec<CapturedRequest> {
    let mut captured = Vec::new();
    for _ in 0..n {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "connection closed before headers");
            data.extend_from_slice(&chunk[..read]);
        };

        let head = String::from_utf8_lossy(&data[..head_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while data.len() < head_end + content_length {
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "connection closed before body");
            data.extend_from_slice(&chunk[..read]);
        }

        captured.push(CapturedRequest {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: data[head_end..head_end + content_length].to_vec(),
        });

        let response = format!(
            "HTTP/1.1 {status} Status\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
        stream.shutdown().await.unwrap();
    }
    captured
}
