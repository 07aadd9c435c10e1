//! Orchestrator: the device's top-level state machine
//!
//! - Setup: wait for the backend, start the notification listener
//! - MainLoop(mode): race notifications against button input
//! - Shutdown: stop the listener and power down

mod machine;
mod state;

pub use machine::{Components, Orchestrator};
