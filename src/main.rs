//! futarin-daemon: voice companion daemon for a two-button device
//!
//! The daemon runs on the device and provides:
//! - Button sampling with press, release and hold detection
//! - Recording and playback through ALSA
//! - Backend requests with bounded retries and a push notification listener
//! - LED status feedback and voice cues
//!
//! The main button records a question (normal mode) or a message (message
//! mode). Tapping the sub button toggles the mode, holding it powers down.

mod audio;
mod backend;
mod button;
mod config;
mod feedback;
mod lifecycle;
mod orchestrator;
mod race;
mod recording;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::audio::{AlsaCapture, AlsaPlayback, FileCues};
use crate::backend::{BackendClient, HttpTransport, WebSocketConnector};
use crate::button::{ButtonMonitor, SysfsButtonSignal};
use crate::config::{Cli, Config};
use crate::feedback::{FeedbackSink, LedFeedback, LogFeedback};
use crate::lifecycle::ShutdownSignal;
use crate::orchestrator::{Components, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "futarin-daemon starting"
    );

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    info!(
        api_origin = %config.backend.api_origin,
        device_id = config.backend.device_id,
        "configuration loaded"
    );

    let signal = SysfsButtonSignal::open(&config.buttons)
        .context("failed to open button GPIOs")?;
    let buttons = ButtonMonitor::spawn(Arc::new(signal), &config.buttons);

    let http = Arc::new(HttpTransport::new(&config.backend)?);
    let push = WebSocketConnector::new(Arc::clone(&http), &config.backend);
    let backend = BackendClient::new(http, Arc::new(push), &config.backend);

    let feedback: Arc<dyn FeedbackSink> = match &config.feedback.led_origin {
        Some(origin) => Arc::new(
            LedFeedback::spawn(origin).context("failed to create LED client")?,
        ),
        None => {
            info!("no LED server configured, feedback is logged only");
            Arc::new(LogFeedback)
        }
    };

    let components = Components {
        buttons,
        backend,
        capture: Arc::new(AlsaCapture::new(&config.audio)),
        playback: Arc::new(AlsaPlayback::new(&config.audio)),
        cues: Arc::new(FileCues::new(&config.audio.cues_dir)),
        feedback,
    };

    // Create shutdown signal handler
    let shutdown = Arc::new(ShutdownSignal::new());
    let mut orchestrator = Orchestrator::new(&config, components, shutdown.subscribe());

    let signals = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match signals.wait().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(?e, "failed to register signal handlers"),
        }
    });

    info!("daemon initialized, entering main loop");
    orchestrator.run().await;

    info!(
        state = %orchestrator.state(),
        mode = %orchestrator.mode(),
        by_signal = shutdown.is_triggered(),
        "futarin-daemon stopped"
    );

    Ok(())
}
