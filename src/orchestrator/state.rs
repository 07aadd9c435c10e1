//! Interaction mode and orchestrator states

/// What a main-button hold records for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Ask the backend and play its reply
    #[default]
    Normal,
    /// Leave a message for the other side
    Message,
}

impl Mode {
    /// The other mode
    pub fn toggle(self) -> Self {
        match self {
            Mode::Normal => Mode::Message,
            Mode::Message => Mode::Normal,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Normal => write!(f, "Normal"),
            Mode::Message => write!(f, "Message"),
        }
    }
}

/// Top-level orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the backend
    Setup,
    /// Racing notifications against button input
    MainLoop(Mode),
    /// Tearing down
    Shutdown,
}

impl Default for State {
    fn default() -> Self {
        Self::Setup
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Setup => write!(f, "Setup"),
            State::MainLoop(mode) => write!(f, "MainLoop({mode})"),
            State::Shutdown => write!(f, "Shutdown"),
        }
    }
}
