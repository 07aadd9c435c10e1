//! Device orchestrator
//!
//! Drives the device from setup through the main loop to shutdown. Every
//! decision is made on the task calling `run`; whenever more than one input
//! could come next, the waits are raced and the losers dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::state::{Mode, State};
use crate::audio::{
    AudioBuffer, AudioCapture, AudioError, AudioPlayback, Cue, CueSource, RecordedAudio,
};
use crate::backend::{BackendClient, BackendResponse, Notification, RequestKind};
use crate::button::{ButtonId, ButtonMonitor};
use crate::config::Config;
use crate::feedback::{FeedbackSignal, FeedbackSink};
use crate::lifecycle::shutdown_requested;
use crate::race::{race, RaceOp};
use crate::recording::RecordingSession;

/// Collaborators handed to the orchestrator
pub struct Components {
    pub buttons: ButtonMonitor,
    pub backend: BackendClient,
    pub capture: Arc<dyn AudioCapture>,
    pub playback: Arc<dyn AudioPlayback>,
    pub cues: Arc<dyn CueSource>,
    pub feedback: Arc<dyn FeedbackSink>,
}

/// Whether the main loop keeps going after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Inputs the main loop waits on
#[derive(Debug)]
enum Wake {
    Shutdown,
    Notification(Notification),
    MainHold,
    SubPress,
}

/// How a sub-button press ended
#[derive(Debug)]
enum SubGesture {
    Shutdown,
    Tap,
    Hold,
}

enum PlaybackEnd {
    Finished(Result<(), AudioError>),
    Skipped,
}

#[derive(Debug, Clone)]
struct Settings {
    mic_device: String,
    skip_introduction: bool,
    min_duration: Duration,
    notification_retry_delay: Duration,
}

/// Sequences buttons, recordings, backend requests and feedback
pub struct Orchestrator {
    state: State,
    mode: Mode,
    /// Time the current state was entered
    state_entered_at: Option<Instant>,
    settings: Settings,
    buttons: ButtonMonitor,
    backend: BackendClient,
    capture: Arc<dyn AudioCapture>,
    playback: Arc<dyn AudioPlayback>,
    cues: Arc<dyn CueSource>,
    feedback: Arc<dyn FeedbackSink>,
    shutdown: watch::Receiver<bool>,
    /// Earliest time a notification is raced again after a failed fetch
    notification_retry_at: Option<Instant>,
}

impl Orchestrator {
    pub fn new(config: &Config, components: Components, shutdown: watch::Receiver<bool>) -> Self {
        let Components {
            buttons,
            backend,
            capture,
            playback,
            cues,
            feedback,
        } = components;

        Self {
            state: State::Setup,
            mode: Mode::Normal,
            state_entered_at: Some(Instant::now()),
            settings: Settings {
                mic_device: config.audio.mic_device.clone(),
                skip_introduction: config.skip_introduction,
                min_duration: config.session.min_duration(),
                notification_retry_delay: config.session.notification_retry_delay(),
            },
            buttons,
            backend,
            capture,
            playback,
            cues,
            feedback,
            shutdown,
            notification_retry_at: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run until the sub button is held or shutdown is requested
    pub async fn run(&mut self) {
        info!(state = %self.state, "orchestrator started");

        if self.setup().await {
            self.transition_to(State::MainLoop(self.mode));
            while self.run_iteration().await == LoopControl::Continue {}
        }

        self.shutdown().await;
    }

    /// Wait for the backend; false if shutdown came first
    async fn setup(&mut self) -> bool {
        self.feedback.emit(FeedbackSignal::SystemSetup);

        let connected = {
            let backend = &self.backend;
            let shutdown = shutdown_requested(self.shutdown.clone());
            let mut ops: Vec<RaceOp<'_, Option<u32>>> = Vec::with_capacity(2);
            ops.push(Box::pin(async move {
                shutdown.await;
                None
            }));
            ops.push(Box::pin(async move { Some(backend.connect().await) }));
            race(ops).await.and_then(|winner| winner.output)
        };

        let Some(attempts) = connected else {
            info!("shutdown requested during setup");
            return false;
        };
        debug!(attempts, "backend connected");

        self.backend.start_notification_listener();
        self.feedback.emit(FeedbackSignal::SystemOn);
        if !self.settings.skip_introduction {
            self.play_cue(Cue::Welcome).await;
        }
        true
    }

    /// Wait for the next input and handle it
    pub async fn run_iteration(&mut self) -> LoopControl {
        let wake = {
            let buttons = &self.buttons;
            let backend = &self.backend;
            let retry_at = self.notification_retry_at;
            let shutdown = shutdown_requested(self.shutdown.clone());

            let mut ops: Vec<RaceOp<'_, Wake>> = Vec::with_capacity(4);
            ops.push(Box::pin(async move {
                shutdown.await;
                Wake::Shutdown
            }));
            ops.push(Box::pin(async move {
                if let Some(at) = retry_at {
                    sleep_until(at).await;
                }
                Wake::Notification(backend.wait_for_notification().await)
            }));
            ops.push(Box::pin(async move {
                buttons.wait_for_hold(ButtonId::Main).await;
                Wake::MainHold
            }));
            ops.push(Box::pin(async move {
                buttons.wait_for_press(ButtonId::Sub).await;
                Wake::SubPress
            }));
            race(ops).await
        };
        let (branch, wake) = wake.map_or((0, Wake::Shutdown), |w| (w.index, w.output));
        debug!(branch, ?wake, mode = %self.mode, "main loop woke");

        match wake {
            Wake::Shutdown => {
                info!("shutdown requested");
                LoopControl::Exit
            }
            Wake::Notification(notification) => {
                self.handle_notification(notification).await;
                LoopControl::Continue
            }
            Wake::MainHold => {
                match self.mode {
                    Mode::Normal => self.normal_session().await,
                    Mode::Message => self.message_session().await,
                }
                LoopControl::Continue
            }
            Wake::SubPress => self.handle_sub_press().await,
        }
    }

    /// Release toggles the mode, holding powers down
    async fn handle_sub_press(&mut self) -> LoopControl {
        let gesture = {
            let buttons = &self.buttons;
            let shutdown = shutdown_requested(self.shutdown.clone());

            let mut ops: Vec<RaceOp<'_, SubGesture>> = Vec::with_capacity(3);
            ops.push(Box::pin(async move {
                shutdown.await;
                SubGesture::Shutdown
            }));
            ops.push(Box::pin(async move {
                buttons.wait_for_release(ButtonId::Sub).await;
                SubGesture::Tap
            }));
            ops.push(Box::pin(async move {
                buttons.wait_for_hold(ButtonId::Sub).await;
                SubGesture::Hold
            }));
            race(ops).await.map_or(SubGesture::Shutdown, |winner| winner.output)
        };

        match gesture {
            SubGesture::Tap => {
                self.toggle_mode().await;
                LoopControl::Continue
            }
            SubGesture::Hold => {
                info!("sub button held, powering down");
                LoopControl::Exit
            }
            SubGesture::Shutdown => LoopControl::Exit,
        }
    }

    async fn toggle_mode(&mut self) {
        self.mode = self.mode.toggle();
        self.transition_to(State::MainLoop(self.mode));

        let cue = match self.mode {
            Mode::Normal => Cue::NormalMode,
            Mode::Message => Cue::MessageMode,
        };
        self.play_cue(cue).await;
    }

    async fn handle_notification(&mut self, notification: Notification) {
        let message_id = notification.message_id;
        info!(message_id, "message waiting");

        match self.backend.fetch_pending_message().await {
            None => debug!(message_id, "notification already handled"),
            Some(BackendResponse::Success(message)) => {
                self.notification_retry_at = None;
                self.feedback.emit(FeedbackSignal::Notifying);
                self.play_cue(Cue::ReceiveMessage).await;

                if !self
                    .unless_shutdown(self.buttons.wait_for_press(ButtonId::Main))
                    .await
                {
                    return;
                }

                self.feedback.emit(FeedbackSignal::AudioPlaying);
                self.play_reply(&message).await;
                self.feedback.emit(FeedbackSignal::ApiSuccess);
            }
            Some(response) => {
                let delay = self.settings.notification_retry_delay;
                warn!(
                    message_id,
                    ?response,
                    retry_in_secs = delay.as_secs(),
                    "could not fetch message"
                );
                self.notification_retry_at = Some(Instant::now() + delay);
                self.feedback.emit(FeedbackSignal::ApiFail);
                self.play_cue(Cue::Fail).await;
            }
        }
    }

    /// Ask the backend and play its reply
    async fn normal_session(&mut self) {
        info!("normal session");
        self.play_cue(Cue::Prompt).await;

        let Some(recording) = self.record_while_held().await else {
            return;
        };

        self.feedback.emit(FeedbackSignal::ApiProcessing);
        let (response, ()) = tokio::join!(
            self.backend.request(RequestKind::Normal, Some(recording.buffer)),
            self.play_cue(Cue::PleaseWait),
        );
        match response {
            BackendResponse::Success(reply) => {
                self.feedback.emit(FeedbackSignal::AudioPlaying);
                self.play_reply(&reply).await;
                self.feedback.emit(FeedbackSignal::ApiSuccess);
            }
            response => {
                warn!(?response, "no reply from backend");
                self.feedback.emit(FeedbackSignal::ApiFail);
                self.play_cue(Cue::Fail).await;
            }
        }
    }

    /// Record and post a message
    async fn message_session(&mut self) {
        info!("message session");
        self.play_cue(Cue::MessagePrompt).await;

        let Some(recording) = self.record_while_held().await else {
            return;
        };

        self.feedback.emit(FeedbackSignal::ApiPostingMessage);
        match self
            .backend
            .request(RequestKind::Message, Some(recording.buffer))
            .await
        {
            BackendResponse::Success(_) => {
                self.feedback.emit(FeedbackSignal::ApiSuccess);
                self.play_cue(Cue::MessageSent).await;
            }
            response => {
                warn!(?response, "message not posted");
                self.feedback.emit(FeedbackSignal::ApiFail);
                self.play_cue(Cue::Fail).await;
            }
        }
    }

    /// Record until the main button is released
    ///
    /// Returns `None` when nothing should be uploaded; the user has
    /// already been told why.
    async fn record_while_held(&mut self) -> Option<RecordedAudio> {
        let mut session =
            RecordingSession::new(Arc::clone(&self.capture), self.settings.mic_device.clone());
        if let Err(e) = session.start() {
            warn!(error = %e, "cannot start recording");
            self.hardware_failed().await;
            return None;
        }
        self.feedback.emit(FeedbackSignal::AudioRecording);

        let released = self
            .unless_shutdown(self.buttons.wait_for_release(ButtonId::Main))
            .await;
        session.stop();

        if let Err(e) = session.join().await {
            warn!(error = %e, "recording failed");
            self.hardware_failed().await;
            return None;
        }
        if !released {
            debug!("recording dropped for shutdown");
            return None;
        }

        let duration = session.duration().unwrap_or_default();
        if duration < self.settings.min_duration {
            info!(
                duration_ms = duration.as_millis() as u64,
                min_ms = self.settings.min_duration.as_millis() as u64,
                "recording too short"
            );
            self.play_cue(Cue::KeepPressing).await;
            return None;
        }

        debug!(
            bytes = session.buffer().map_or(0, AudioBuffer::len),
            "recording accepted"
        );
        session.into_recording()
    }

    async fn hardware_failed(&self) {
        self.feedback.emit(FeedbackSignal::ApiFail);
        self.play_cue(Cue::Fail).await;
    }

    async fn shutdown(&mut self) {
        self.transition_to(State::Shutdown);
        self.backend.stop_notification_listener().await;
        self.feedback.emit(FeedbackSignal::SystemOff);
        self.play_cue(Cue::Shutdown).await;
        if self.buttons.is_running() {
            self.buttons.stop().await;
        }
        info!("orchestrator stopped");
    }

    /// Wait for `op` unless shutdown comes first; true if `op` finished
    async fn unless_shutdown<'a>(&self, op: impl Future<Output = ()> + Send + 'a) -> bool {
        let shutdown = shutdown_requested(self.shutdown.clone());
        let mut ops: Vec<RaceOp<'a, bool>> = Vec::with_capacity(2);
        ops.push(Box::pin(async move {
            shutdown.await;
            false
        }));
        ops.push(Box::pin(async move {
            op.await;
            true
        }));
        race(ops).await.is_some_and(|winner| winner.output)
    }

    async fn play_cue(&self, cue: Cue) {
        let audio = match self.cues.load(cue).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(%cue, error = %e, "cannot load cue");
                return;
            }
        };
        debug!(%cue, "playing cue");

        match self.playback.play(&audio) {
            Ok(mut handle) => {
                if let Err(e) = handle.join().await {
                    warn!(%cue, error = %e, "cue playback failed");
                }
            }
            Err(e) => warn!(%cue, error = %e, "cannot start playback"),
        }
    }

    /// Play backend audio; a main-button press cuts it short
    async fn play_reply(&self, audio: &AudioBuffer) {
        let mut handle = match self.playback.play(audio) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "cannot start playback");
                return;
            }
        };

        let end = {
            let buttons = &self.buttons;
            let playing = &mut handle;
            let mut ops: Vec<RaceOp<'_, PlaybackEnd>> = Vec::with_capacity(2);
            ops.push(Box::pin(async move { PlaybackEnd::Finished(playing.join().await) }));
            ops.push(Box::pin(async move {
                buttons.wait_for_press(ButtonId::Main).await;
                PlaybackEnd::Skipped
            }));
            race(ops)
                .await
                .map_or(PlaybackEnd::Finished(Ok(())), |winner| winner.output)
        };

        let result = match end {
            PlaybackEnd::Finished(result) => result,
            PlaybackEnd::Skipped => {
                info!("playback skipped");
                handle.stop();
                handle.join().await
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "playback failed");
        }
    }

    fn transition_to(&mut self, new_state: State) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Some(Instant::now());
    }
}
