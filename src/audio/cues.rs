//! Pre-recorded voice cues

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{AudioBuffer, AudioError};

/// Voice cues played through the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Welcome,
    Shutdown,
    /// Asks what the user wants to say in normal mode
    Prompt,
    /// Asks for the message to send in message mode
    MessagePrompt,
    /// The recording was too short
    KeepPressing,
    NormalMode,
    MessageMode,
    MessageSent,
    /// A message from the backend is waiting
    ReceiveMessage,
    /// Played while the backend works on a question
    PleaseWait,
    Fail,
}

impl Cue {
    /// File name of the cue inside the cues directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Cue::Welcome => "welcome.wav",
            Cue::Shutdown => "shutdown.wav",
            Cue::Prompt => "whatup.wav",
            Cue::MessagePrompt => "send_message.wav",
            Cue::KeepPressing => "keep_pressing.wav",
            Cue::NormalMode => "normal.wav",
            Cue::MessageMode => "message_mode.wav",
            Cue::MessageSent => "message_sent.wav",
            Cue::ReceiveMessage => "receive_message.wav",
            Cue::PleaseWait => "please_wait.wav",
            Cue::Fail => "fail.wav",
        }
    }
}

impl std::fmt::Display for Cue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.file_name();
        write!(f, "{}", name.trim_end_matches(".wav"))
    }
}

/// Where cue audio comes from
#[async_trait]
pub trait CueSource: Send + Sync {
    async fn load(&self, cue: Cue) -> Result<AudioBuffer, AudioError>;
}

/// Cues read from WAV files in a directory
#[derive(Debug, Clone)]
pub struct FileCues {
    dir: PathBuf,
}

impl FileCues {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, cue: Cue) -> PathBuf {
        self.dir.join(cue.file_name())
    }
}

#[async_trait]
impl CueSource for FileCues {
    async fn load(&self, cue: Cue) -> Result<AudioBuffer, AudioError> {
        let path = self.path(cue);
        debug!(%cue, path = %path.display(), "loading cue");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AudioError::CueMissing {
                cue,
                reason: format!("{}: {e}", path.display()),
            })?;
        Ok(AudioBuffer::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_cue_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fail.wav"), b"RIFF").unwrap();

        let cues = FileCues::new(dir.path());
        let audio = cues.load(Cue::Fail).await.unwrap();
        assert_eq!(audio.as_bytes(), b"RIFF");
    }

    #[tokio::test]
    async fn test_missing_cue() {
        let dir = tempfile::tempdir().unwrap();
        let cues = FileCues::new(dir.path());
        let err = cues.load(Cue::Welcome).await.unwrap_err();
        assert!(matches!(err, AudioError::CueMissing { cue: Cue::Welcome, .. }));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cue::MessageMode.to_string(), "message_mode");
        assert_eq!(Cue::Prompt.to_string(), "whatup");
    }
}
