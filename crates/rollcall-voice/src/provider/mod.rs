//! Network speech synthesis.
//!
//! The cache talks to a [`SpeechProvider`] trait object so the remote
//! service can be swapped (or mocked) without touching the cache logic.
//! [`HttpSpeechProvider`] is the production implementation; retry policy
//! lives in [`retry`] and is applied by the caller, not the provider.

mod http;
mod retry;

pub use http::{HttpProviderConfig, HttpSpeechProvider};
pub use retry::{RetryPolicy, Synthesized, synthesize_with_retry};

use async_trait::async_trait;

use crate::audio::PcmAudio;
use crate::error::VoiceError;

/// Remote text-to-speech service.
///
/// One call is one attempt. Implementations report transient failures as
/// [`VoiceError::Transport`] and permanent ones as
/// [`VoiceError::Provider`] so the retry policy can tell them apart.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text` with `voice`, returning decoded mono PCM.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<PcmAudio, VoiceError>;
}
