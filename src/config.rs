//! Configuration loading and management
//!
//! Values come from `futarin.toml` (explicit `--config-file`, or the first
//! one found walking up from the working directory). Command-line flags
//! override the file. Every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Name of the config file searched for when none is given
pub const CONFIG_FILE_NAME: &str = "futarin.toml";

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[command(name = "futarin-daemon", version, about)]
pub struct Cli {
    /// Use a custom config file path
    #[arg(short = 'f', long = "config-file", value_name = "CONFIG_FILE_PATH")]
    pub config_file: Option<PathBuf>,

    /// Skip playing the introduction message at startup
    #[arg(long)]
    pub skip_introduction: bool,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Do not play the welcome cue at startup
    pub skip_introduction: bool,
    pub backend: BackendConfig,
    pub buttons: ButtonConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub feedback: FeedbackConfig,
}

/// Backend API and push channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme, host and port of the API, e.g. `https://api.example.com`
    pub api_origin: String,
    pub api_version: u32,
    /// Identifier of this device on the backend
    pub device_id: u64,
    /// Maximum attempts for one logical request
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound for a single attempt
    pub request_timeout_secs: u64,
    /// Delay between reachability probes while connecting
    pub ping_interval_secs: u64,
    /// Delay before the push listener reconnects
    pub reconnect_delay_secs: u64,
    /// Ping period on the push channel
    pub keepalive_interval_ms: u64,
    /// Silence after which the push channel counts as dead
    pub keepalive_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_origin: "http://localhost:8000".to_string(),
            api_version: 2,
            device_id: 0,
            retries: 4,
            retry_delay_ms: 1000,
            request_timeout_secs: 120,
            ping_interval_secs: 10,
            reconnect_delay_secs: 5,
            keepalive_interval_ms: 1000,
            keepalive_timeout_secs: 20,
        }
    }
}

impl BackendConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }
}

/// GPIO button settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// BCM pin of the main button
    pub main_pin: u32,
    /// BCM pin of the sub button
    pub sub_pin: u32,
    /// Buttons pull the line to ground when pressed
    pub active_low: bool,
    pub sample_interval_ms: u64,
    /// Continuous press needed before the main button counts as held
    pub main_hold_ms: u64,
    /// Continuous press needed before the sub button counts as held
    pub sub_hold_ms: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            main_pin: 17,
            sub_pin: 27,
            active_low: true,
            sample_interval_ms: 100,
            main_hold_ms: 500,
            sub_hold_ms: 3000,
        }
    }
}

impl ButtonConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn main_hold(&self) -> Duration {
        Duration::from_millis(self.main_hold_ms)
    }

    pub fn sub_hold(&self) -> Duration {
        Duration::from_millis(self.sub_hold_ms)
    }
}

/// Microphone, speaker and cue settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ALSA capture device
    pub mic_device: String,
    /// ALSA playback device
    pub speaker_device: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Directory holding the voice cue WAV files
    pub cues_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mic_device: "default".to_string(),
            speaker_device: "default".to_string(),
            sample_rate: 44100,
            channels: 2,
            cues_dir: PathBuf::from("assets/vox"),
        }
    }
}

/// Orchestrator session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Recordings shorter than this are rejected without a backend call
    pub min_duration_ms: u64,
    /// Wait before retrying a notification whose fetch failed
    pub notification_retry_delay_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 1000,
            notification_retry_delay_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn notification_retry_delay(&self) -> Duration {
        Duration::from_secs(self.notification_retry_delay_secs)
    }
}

/// LED server settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Origin of the LED pattern server; feedback is only logged when unset
    pub led_origin: Option<String>,
}

impl Config {
    /// Load configuration from the config file and command-line flags
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = match &cli.config_file {
            Some(path) => path.clone(),
            None => {
                let cwd = std::env::current_dir().context("failed to read working directory")?;
                match find_config_file(&cwd) {
                    Some(path) => path,
                    None => bail!("config file {} not found", CONFIG_FILE_NAME),
                }
            }
        };

        let mut config = Self::from_file(&path)?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Let command-line flags override file values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.skip_introduction {
            self.skip_introduction = true;
        }
    }
}

/// Search `start` and its ancestors for the config file
fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}
