//! Microphone recording sessions

mod session;

pub use session::RecordingSession;
