//! Button input for the two physical buttons
//!
//! Raw levels come from a `ButtonSignal` (sysfs GPIO on the device); the
//! `ButtonMonitor` samples them at a fixed interval and turns them into
//! press, release and hold transitions.

mod gpio;
mod monitor;
mod state;

pub use gpio::SysfsButtonSignal;
#[cfg(test)]
pub use gpio::{ButtonError, ButtonSignal};
pub use monitor::ButtonMonitor;
pub use state::ButtonId;
