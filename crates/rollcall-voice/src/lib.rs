//! Spoken announcements for rollcall result lists.
//!
//! [`TtsHandler`] is the entry point. Behind it:
//!
//! - [`cache`]: two-tier (memory LRU + WAV directory) cache in front of a
//!   network [`provider`]
//! - [`playback`]: bounded queue drained by a dedicated output thread
//! - [`load`]: CPU/memory driven sizing of the playback queue
//! - [`local`]: synchronous on-device engine for offline announcements

#![deny(unused_crate_dependencies)]

// Only the integration tests install a subscriber.
#[cfg(test)]
use tracing_subscriber as _;

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod load;
pub mod local;
pub mod playback;
pub mod provider;

pub use audio::PcmAudio;
pub use cache::{CacheKey, CacheStats, VoiceCacheManager};
pub use config::VoiceConfig;
pub use error::VoiceError;
pub use handler::{RunHandle, TtsHandler, TtsHandlerBuilder, TtsStatus};
pub use load::{FixedProbe, LoadBalancer, LoadProbe, LoadSample, SysinfoProbe, optimal_queue_size};
pub use local::{CommandSpeechEngine, LocalSpeech, LocalSpeechEngine};
pub use playback::{
    AudioOutput, PlaybackStatus, PlaybackStream, PlaybackTask, RodioOutput, VoicePlaybackSystem,
};
pub use provider::{HttpProviderConfig, HttpSpeechProvider, SpeechProvider};
