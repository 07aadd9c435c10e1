//! Sampled button monitor
//!
//! A sampler task reads both buttons once per sampling interval, runs each
//! level through a `ButtonTracker` and publishes the result on a watch
//! channel per button. Waiters park on those channels, so they only ever
//! wake on sample boundaries.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::gpio::{ButtonError, ButtonSignal};
use super::state::{ButtonId, ButtonSnapshot, ButtonState, ButtonTracker};
use crate::config::ButtonConfig;

/// Edge and hold detection for the main and sub buttons
pub struct ButtonMonitor {
    main: watch::Receiver<ButtonSnapshot>,
    sub: watch::Receiver<ButtonSnapshot>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonMonitor {
    /// Start sampling `signal` with the intervals and thresholds in `config`
    pub fn spawn(signal: Arc<dyn ButtonSignal>, config: &ButtonConfig) -> Self {
        let (main_tx, main) = watch::channel(ButtonSnapshot::default());
        let (sub_tx, sub) = watch::channel(ButtonSnapshot::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = Arc::new(AtomicBool::new(true));

        let channels = [
            Channel::new(ButtonTracker::new(ButtonId::Main, config.main_hold()), main_tx),
            Channel::new(ButtonTracker::new(ButtonId::Sub, config.sub_hold()), sub_tx),
        ];

        let sample_interval = config.sample_interval();
        let sampler_running = Arc::clone(&running);
        let handle = tokio::spawn(async move {
            info!(interval_ms = sample_interval.as_millis() as u64, "button sampler started");
            run_sampler(signal, channels, sample_interval, shutdown_rx).await;
            sampler_running.store(false, Ordering::SeqCst);
            info!("button sampler stopped");
        });

        Self {
            main,
            sub,
            running,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Current state of a button
    #[cfg(test)]
    pub fn state(&self, button: ButtonId) -> ButtonState {
        self.channel(button).borrow().state
    }

    /// Resolve at the next Released→Pressed transition
    pub async fn wait_for_press(&self, button: ButtonId) {
        let mut rx = self.channel(button).clone();
        let seen = rx.borrow_and_update().presses;
        debug!(%button, "waiting for press");
        wait_until(&mut rx, |s| s.presses > seen).await;
        debug!(%button, "pressed");
    }

    /// Resolve at the next Pressed→Held transition
    pub async fn wait_for_hold(&self, button: ButtonId) {
        let mut rx = self.channel(button).clone();
        let seen = rx.borrow_and_update().holds;
        debug!(%button, "waiting for hold");
        wait_until(&mut rx, |s| s.holds > seen).await;
        debug!(%button, "held");
    }

    /// Resolve once the button is released (immediately if it already is)
    pub async fn wait_for_release(&self, button: ButtonId) {
        let mut rx = self.channel(button).clone();
        debug!(%button, "waiting for release");
        wait_until(&mut rx, |s| s.state == ButtonState::Released).await;
        debug!(%button, "released");
    }

    /// Check if the sampler task is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the sampler and wait for it to exit
    ///
    /// Waits that are still pending afterwards never resolve.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(?e, "button sampler task failed");
            }
        }
    }

    fn channel(&self, button: ButtonId) -> &watch::Receiver<ButtonSnapshot> {
        match button {
            ButtonId::Main => &self.main,
            ButtonId::Sub => &self.sub,
        }
    }
}

impl Drop for ButtonMonitor {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Tracker and publisher for one button, owned by the sampler
struct Channel {
    tracker: ButtonTracker,
    tx: watch::Sender<ButtonSnapshot>,
    read_failing: bool,
}

impl Channel {
    fn new(tracker: ButtonTracker, tx: watch::Sender<ButtonSnapshot>) -> Self {
        Self {
            tracker,
            tx,
            read_failing: false,
        }
    }
}

async fn run_sampler(
    signal: Arc<dyn ButtonSignal>,
    mut channels: [Channel; 2],
    sample_interval: std::time::Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval(sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                // sysfs reads block, keep them off the runtime threads
                let reader = Arc::clone(&signal);
                let levels = spawn_blocking(move || {
                    [ButtonId::Main, ButtonId::Sub].map(|button| reader.is_pressed(button))
                })
                .await;

                match levels {
                    Ok(levels) => {
                        for (channel, level) in channels.iter_mut().zip(levels) {
                            sample_one(channel, level, now);
                        }
                    }
                    Err(e) => warn!(?e, "button read task failed"),
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

fn sample_one(channel: &mut Channel, level: Result<bool, ButtonError>, now: Instant) {
    let button = channel.tracker.button();
    let pressed = match level {
        Ok(pressed) => {
            if channel.read_failing {
                info!(%button, "button readable again");
                channel.read_failing = false;
            }
            pressed
        }
        Err(e) => {
            if !channel.read_failing {
                warn!(%button, error = %e, "button read failed, treating as released");
                channel.read_failing = true;
            }
            false
        }
    };

    if let Some(event) = channel.tracker.sample(pressed, now) {
        debug!(button = %event.button, kind = ?event.kind, "button event");
        channel.tx.send_modify(|snapshot| snapshot.apply(event.kind));
    }
}

/// Park on `rx` until `done` holds; a closed channel never resolves
async fn wait_until(
    rx: &mut watch::Receiver<ButtonSnapshot>,
    done: impl FnMut(&ButtonSnapshot) -> bool,
) {
    let closed = rx.wait_for(done).await.is_err();
    if closed {
        pending::<()>().await;
    }
}
