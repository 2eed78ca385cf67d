//! Subsystem configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;
use crate::provider::HttpProviderConfig;

/// Configuration for the announcement subsystem.
///
/// Every field has a default, so hosts only set what they need to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Directory for cached `<voice>_<text>.wav` files. `None` resolves to the
    /// platform data directory.
    pub cache_dir: Option<PathBuf>,

    /// Number of decoded clips kept in the in-memory tier.
    pub memory_capacity: usize,

    /// Text is truncated to this many characters before synthesis.
    pub max_text_chars: usize,

    /// Synthesis attempts per utterance (including the first).
    pub synthesis_attempts: u32,

    /// Fixed delay between synthesis attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// How often the cache housekeeping hook runs, in seconds.
    pub housekeeping_interval_secs: u64,

    /// Maximum concurrent background disk writes.
    pub persist_concurrency: usize,

    /// Worker threads in the synthesis pool.
    pub pool_workers: usize,

    /// Samples written to the output device per chunk.
    pub chunk_samples: usize,

    /// Queue poll timeout for the playback worker, in milliseconds.
    pub poll_interval_ms: u64,

    /// Upper bound on how long `stop` waits for the playback worker, in
    /// milliseconds.
    pub stop_timeout_ms: u64,

    /// Network synthesis endpoint used when no provider is injected.
    pub provider: HttpProviderConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            memory_capacity: 25,
            max_text_chars: 500,
            synthesis_attempts: 3,
            retry_delay_ms: 500,
            housekeeping_interval_secs: 3600,
            persist_concurrency: 2,
            pool_workers: 4,
            chunk_samples: 1024,
            poll_interval_ms: 100,
            stop_timeout_ms: 2000,
            provider: HttpProviderConfig::default(),
        }
    }
}

impl VoiceConfig {
    /// Check that every field is usable.
    pub fn validate(&self) -> Result<(), VoiceError> {
        let nonzero = [
            ("memory_capacity", self.memory_capacity),
            ("max_text_chars", self.max_text_chars),
            ("persist_concurrency", self.persist_concurrency),
            ("pool_workers", self.pool_workers),
            ("chunk_samples", self.chunk_samples),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(VoiceError::InvalidConfig(format!("{field} must be > 0")));
            }
        }

        if self.synthesis_attempts == 0 {
            return Err(VoiceError::InvalidConfig(
                "synthesis_attempts must be > 0".into(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(VoiceError::InvalidConfig(
                "poll_interval_ms must be > 0".into(),
            ));
        }

        if self
            .cache_dir
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(VoiceError::InvalidConfig("cache_dir cannot be empty".into()));
        }

        if self.provider.endpoint.trim().is_empty() {
            return Err(VoiceError::InvalidConfig(
                "provider endpoint cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the cache directory, falling back to the platform default.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, VoiceError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(rollcall_core::default_voice_cache_dir()?),
        }
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
