//! Two-tier voice cache.
//!
//! Resolves `(text, voice)` to decoded PCM through three layers, in order:
//!
//! 1. a bounded in-memory LRU ([`MemoryCache`]),
//! 2. an unbounded directory of WAV files ([`DiskStore`]),
//! 3. the network [`SpeechProvider`], retried under a [`RetryPolicy`].
//!
//! Fresh synthesis results are mirrored to disk in the background. Writes
//! are bounded by a semaphore and tracked so [`VoiceCacheManager::flush`]
//! can wait for them on shutdown.
//!
//! Two concurrent misses on the same key are not coalesced: both call the
//! provider and both write the file, last writer wins.

mod disk;
mod key;
mod memory;

pub use disk::{DiskStore, DiskUsage};
pub use key::{CacheKey, sanitize};
pub use memory::{EvictionCallback, MemoryCache};

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::audio::PcmAudio;
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::provider::{RetryPolicy, SpeechProvider, synthesize_with_retry};

/// Snapshot of cache activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub provider_calls: u64,
    pub evictions: u64,
    pub persist_failures: u64,
    /// Housekeeping sweeps started, throttled or explicit.
    pub housekeeping_runs: u64,
    pub memory_entries: usize,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    provider_calls: AtomicU64,
    evictions: AtomicU64,
    persist_failures: AtomicU64,
    housekeeping_runs: AtomicU64,
}

/// Content-addressed cache in front of a speech provider.
pub struct VoiceCacheManager {
    provider: Arc<dyn SpeechProvider>,
    disk: Arc<DiskStore>,
    memory: Mutex<MemoryCache<CacheKey, PcmAudio>>,
    counters: Arc<Counters>,
    persist: TaskTracker,
    persist_permits: Arc<Semaphore>,
    policy: RetryPolicy,
    max_text_chars: usize,
    housekeeping_interval: Duration,
    last_housekeeping: Mutex<Option<Instant>>,
}

impl VoiceCacheManager {
    /// Build a cache from `config`, creating the cache directory if needed.
    pub fn new(config: &VoiceConfig, provider: Arc<dyn SpeechProvider>) -> Result<Self, VoiceError> {
        config.validate()?;
        let dir = config.resolve_cache_dir()?;
        let disk = Arc::new(DiskStore::open(dir)?);

        let capacity = NonZeroUsize::new(config.memory_capacity)
            .ok_or_else(|| VoiceError::InvalidConfig("memory_capacity must be > 0".into()))?;
        let counters = Arc::new(Counters::default());
        let evicted = Arc::clone(&counters);
        let memory = MemoryCache::new(capacity).with_eviction_callback(Box::new(
            move |key: &CacheKey, _: &PcmAudio| {
                evicted.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Evicted clip from memory cache");
            },
        ));

        tracing::debug!(
            dir = %disk.dir().display(),
            capacity = config.memory_capacity,
            "Voice cache ready"
        );

        Ok(Self {
            provider,
            disk,
            memory: Mutex::new(memory),
            counters,
            persist: TaskTracker::new(),
            persist_permits: Arc::new(Semaphore::new(config.persist_concurrency)),
            policy: RetryPolicy {
                attempts: config.synthesis_attempts,
                delay: config.retry_delay(),
            },
            max_text_chars: config.max_text_chars,
            housekeeping_interval: config.housekeeping_interval(),
            last_housekeeping: Mutex::new(None),
        })
    }

    /// Resolve `text` spoken by `voice` to PCM.
    ///
    /// # Errors
    ///
    /// [`VoiceError::Validation`] if either argument is empty, or
    /// [`VoiceError::SynthesisError`] when the provider cannot produce audio.
    /// Disk read and write failures are logged and fall through.
    pub async fn get_voice(&self, text: &str, voice: &str) -> Result<PcmAudio, VoiceError> {
        if text.is_empty() {
            return Err(VoiceError::Validation("text cannot be empty".into()));
        }
        if voice.is_empty() {
            return Err(VoiceError::Validation("voice cannot be empty".into()));
        }

        self.maybe_housekeeping();

        let key = CacheKey::new(text, voice);

        let resident = self.lock_memory().get(&key);
        if let Some(audio) = resident {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, "Memory cache hit");
            return Ok(audio);
        }

        if let Some(audio) = self.load_from_disk(&key).await {
            self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Disk cache hit");
            self.lock_memory().insert(key, audio.clone());
            return Ok(audio);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let bounded = truncate_chars(text, self.max_text_chars);
        if bounded.len() < text.len() {
            tracing::debug!(
                chars = self.max_text_chars,
                "Truncated announcement text before synthesis"
            );
        }

        let result = synthesize_with_retry(self.provider.as_ref(), bounded, voice, self.policy).await;
        let synthesized = match result {
            Ok(s) => {
                self.counters
                    .provider_calls
                    .fetch_add(u64::from(s.attempts), Ordering::Relaxed);
                s
            }
            Err(e) => {
                if let VoiceError::SynthesisError { attempts, .. } = &e {
                    self.counters
                        .provider_calls
                        .fetch_add(u64::from(*attempts), Ordering::Relaxed);
                }
                return Err(e);
            }
        };

        tracing::debug!(
            key = %key,
            attempts = synthesized.attempts,
            duration_ms = synthesized.audio.duration().as_millis(),
            "Synthesized clip"
        );

        self.persist_in_background(key.clone(), synthesized.audio.clone());
        self.lock_memory().insert(key, synthesized.audio.clone());
        Ok(synthesized.audio)
    }

    /// Wait for every background disk write started so far.
    pub async fn flush(&self) {
        self.persist.close();
        self.persist.wait().await;
        self.persist.reopen();
    }

    /// Walk the cache directory and report its size.
    ///
    /// Retention is "never expire": nothing is deleted.
    pub async fn housekeeping(&self) -> Result<DiskUsage, VoiceError> {
        self.counters.housekeeping_runs.fetch_add(1, Ordering::Relaxed);
        let disk = Arc::clone(&self.disk);
        let usage = tokio::task::spawn_blocking(move || disk.usage())
            .await
            .map_err(|e| VoiceError::Worker(e.to_string()))??;
        tracing::debug!(
            files = usage.files,
            bytes = usage.bytes,
            "Voice cache housekeeping"
        );
        Ok(usage)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            disk_hits: c.disk_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            provider_calls: c.provider_calls.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
            housekeeping_runs: c.housekeeping_runs.load(Ordering::Relaxed),
            memory_entries: self.lock_memory().len(),
        }
    }

    /// Directory holding the WAV files.
    #[must_use]
    pub fn cache_dir(&self) -> &std::path::Path {
        self.disk.dir()
    }

    /// Whether `(text, voice)` is resident in memory. Does not touch recency.
    #[must_use]
    pub fn is_in_memory(&self, text: &str, voice: &str) -> bool {
        self.lock_memory().contains(&CacheKey::new(text, voice))
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, MemoryCache<CacheKey, PcmAudio>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load_from_disk(&self, key: &CacheKey) -> Option<PcmAudio> {
        let disk = Arc::clone(&self.disk);
        let owned = key.clone();
        match tokio::task::spawn_blocking(move || disk.load(&owned)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Unreadable cache file, resynthesizing");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Disk cache read task failed");
                None
            }
        }
    }

    fn persist_in_background(&self, key: CacheKey, audio: PcmAudio) {
        let disk = Arc::clone(&self.disk);
        let permits = Arc::clone(&self.persist_permits);
        let counters = Arc::clone(&self.counters);

        self.persist.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let label = key.clone();
            let result = tokio::task::spawn_blocking(move || disk.store(&key, &audio)).await;
            match result {
                Ok(Ok(path)) => {
                    tracing::trace!(path = %path.display(), "Persisted clip");
                }
                Ok(Err(e)) => {
                    counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %label, error = %e, "Failed to persist clip, keeping it in memory only");
                }
                Err(e) => {
                    counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %label, error = %e, "Persist task failed");
                }
            }
        });
    }

    fn maybe_housekeeping(&self) {
        let now = Instant::now();
        {
            let mut last = self
                .last_housekeeping
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match *last {
                Some(at) if now.duration_since(at) < self.housekeeping_interval => return,
                _ => *last = Some(now),
            }
        }
        self.counters.housekeeping_runs.fetch_add(1, Ordering::Relaxed);

        let disk = Arc::clone(&self.disk);
        self.persist.spawn(async move {
            match tokio::task::spawn_blocking(move || disk.usage()).await {
                Ok(Ok(usage)) => tracing::debug!(
                    files = usage.files,
                    bytes = usage.bytes,
                    "Voice cache housekeeping"
                ),
                Ok(Err(e)) => tracing::debug!(error = %e, "Voice cache housekeeping failed"),
                Err(e) => tracing::debug!(error = %e, "Voice cache housekeeping task failed"),
            }
        });
    }
}

/// Prefix of `text` holding at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
