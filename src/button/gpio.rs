//! Raw button level sensing
//!
//! `ButtonSignal` is the only thing the monitor needs from the hardware.
//! The sysfs implementation reads `/sys/class/gpio/gpioN/value`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::state::ButtonId;
use crate::config::ButtonConfig;

/// Errors that can occur while sensing buttons
#[derive(Debug, thiserror::Error)]
pub enum ButtonError {
    #[error("failed to export GPIO pin {pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read GPIO pin {pin}: {source}")]
    Read {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected value {value:?} on GPIO pin {pin}")]
    InvalidLevel { pin: u32, value: String },
}

/// A source of instantaneous pressed/released levels
pub trait ButtonSignal: Send + Sync {
    /// Whether the button is pressed right now
    fn is_pressed(&self, button: ButtonId) -> Result<bool, ButtonError>;
}

/// Button levels read through the Linux sysfs GPIO interface
#[derive(Debug)]
pub struct SysfsButtonSignal {
    main: PathBuf,
    sub: PathBuf,
    main_pin: u32,
    sub_pin: u32,
    active_low: bool,
}

impl SysfsButtonSignal {
    const GPIO_ROOT: &'static str = "/sys/class/gpio";

    /// Export both pins as inputs and return a reader for them
    pub fn open(config: &ButtonConfig) -> Result<Self, ButtonError> {
        Self::open_at(Path::new(Self::GPIO_ROOT), config)
    }

    fn open_at(root: &Path, config: &ButtonConfig) -> Result<Self, ButtonError> {
        let main = export_input(root, config.main_pin)?;
        let sub = export_input(root, config.sub_pin)?;

        info!(
            main_pin = config.main_pin,
            sub_pin = config.sub_pin,
            active_low = config.active_low,
            "GPIO buttons ready"
        );

        Ok(Self {
            main,
            sub,
            main_pin: config.main_pin,
            sub_pin: config.sub_pin,
            active_low: config.active_low,
        })
    }
}

impl ButtonSignal for SysfsButtonSignal {
    fn is_pressed(&self, button: ButtonId) -> Result<bool, ButtonError> {
        let (path, pin) = match button {
            ButtonId::Main => (&self.main, self.main_pin),
            ButtonId::Sub => (&self.sub, self.sub_pin),
        };

        let raw = fs::read_to_string(path).map_err(|source| ButtonError::Read { pin, source })?;
        let high = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(ButtonError::InvalidLevel {
                    pin,
                    value: other.to_string(),
                })
            }
        };

        Ok(high != self.active_low)
    }
}

/// Export `pin` if needed, configure it as an input and return its value path
fn export_input(root: &Path, pin: u32) -> Result<PathBuf, ButtonError> {
    let pin_dir = root.join(format!("gpio{pin}"));

    if !pin_dir.exists() {
        debug!(pin, "exporting GPIO pin");
        fs::write(root.join("export"), pin.to_string())
            .map_err(|source| ButtonError::Export { pin, source })?;
    }

    fs::write(pin_dir.join("direction"), "in")
        .map_err(|source| ButtonError::Export { pin, source })?;

    Ok(pin_dir.join("value"))
}
