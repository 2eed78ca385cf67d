//! Voice announcement error types.

use std::path::PathBuf;

/// Errors that can occur in the announcement subsystem.
///
/// None of these ever reach the caller of
/// [`TtsHandler::voice_play`](crate::handler::TtsHandler::voice_play); they
/// are logged at the boundary where the affected utterance or task is
/// skipped.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// A request failed shape or range validation.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Run settings supplied by the host were rejected.
    #[error(transparent)]
    Settings(#[from] rollcall_core::SettingsError),

    /// Subsystem configuration is invalid.
    #[error("Invalid voice configuration: {0}")]
    InvalidConfig(String),

    /// The provider returned no audio.
    #[error("Provider returned empty audio")]
    EmptyAudio,

    /// Network-level failure talking to the provider (retryable).
    #[error("Provider transport error: {0}")]
    Transport(String),

    /// The provider rejected the request (not retried).
    #[error("Provider rejected request ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Synthesis failed after exhausting the retry policy.
    #[error("Speech synthesis failed after {attempts} attempt(s): {reason}")]
    SynthesisError { attempts: u32, reason: String },

    /// Audio bytes could not be decoded or encoded.
    #[error("Audio codec error: {0}")]
    AudioCodec(String),

    /// Failed to open the audio output device.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// Writing to the audio output failed mid-task.
    #[error("Playback failed: {0}")]
    Playback(String),

    /// A persisted audio file referenced by a task is missing.
    #[error("Audio file not found at {0}")]
    AudioFileNotFound(PathBuf),

    /// The local speech engine failed.
    #[error("Local speech engine error: {0}")]
    LocalEngine(String),

    /// No local speech engine is available on this machine.
    #[error("No local speech engine available")]
    LocalEngineUnavailable,

    /// Failed to spawn a worker thread or runtime.
    #[error("Failed to start worker: {0}")]
    Worker(String),

    /// Cache directory could not be prepared.
    #[error(transparent)]
    Path(#[from] rollcall_core::PathError),

    /// IO error (cache directory, audio files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by a stop request.
    #[error("Voice operation cancelled")]
    Cancelled,
}

impl VoiceError {
    /// Whether a synthesis attempt that failed with this error may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::EmptyAudio | Self::Transport(_))
    }
}

impl From<hound::Error> for VoiceError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => Self::Io(io),
            other => Self::AudioCodec(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => Self::Provider {
                status: status.as_u16(),
                message: e.to_string(),
            },
            _ => Self::Transport(e.to_string()),
        }
    }
}
