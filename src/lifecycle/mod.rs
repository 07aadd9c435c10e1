//! Process lifecycle

mod shutdown;

pub use shutdown::{requested as shutdown_requested, ShutdownSignal};
