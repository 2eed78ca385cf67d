//! Playback pipeline: a bounded queue drained by one dedicated worker thread.
//!
//! Producers call [`VoicePlaybackSystem::add_task`], which never blocks.
//! The worker pops tasks in FIFO order, re-sizes the queue from the
//! [`LoadBalancer`] after every dequeue, and renders each task to the
//! [`AudioOutput`] in fixed-size chunks. Cancellation is checked between
//! chunks and while waiting on the queue or a backed-up device.
//!
//! ```text
//!   add_task ──► PlaybackQueue ──► worker thread ──► AudioOutput
//!                    ▲                  │
//!                    └── set_capacity ◄─┴── LoadBalancer
//! ```

mod output;
mod queue;
mod task;

pub use output::{AudioOutput, PlaybackStream, RodioOutput};
pub use task::{PlaybackSource, PlaybackTask};

use queue::PlaybackQueue;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rollcall_core::{DEFAULT_SPEED, DEFAULT_VOLUME, MAX_SPEED, MAX_VOLUME};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::load::LoadBalancer;

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Point-in-time view of the playback system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackStatus {
    pub running: bool,
    pub queued: usize,
    pub capacity: usize,
    pub current: Option<String>,
    pub last_error: Option<String>,
    pub volume: u32,
    pub speed: u32,
}

#[derive(Default)]
struct PlaybackState {
    current: Option<String>,
    last_error: Option<String>,
}

/// State shared between the public handle and the worker thread.
struct Shared {
    queue: PlaybackQueue,
    balancer: LoadBalancer,
    output: Arc<dyn AudioOutput>,
    // Plain settings read once per task; not synchronised with a run.
    volume: AtomicU32,
    speed: AtomicU32,
    state: Mutex<PlaybackState>,
    chunk_samples: usize,
    poll_interval: Duration,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Bounded single-consumer playback pipeline.
pub struct VoicePlaybackSystem {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    stop_timeout: Duration,
}

impl VoicePlaybackSystem {
    /// Create a stopped playback system. Call [`start`](Self::start) to
    /// begin draining the queue.
    pub fn new(output: Arc<dyn AudioOutput>, balancer: LoadBalancer, config: &VoiceConfig) -> Self {
        let capacity = balancer.get_optimal_queue_size();
        tracing::debug!(capacity, "Playback queue created");

        Self {
            shared: Arc::new(Shared {
                queue: PlaybackQueue::new(capacity),
                balancer,
                output,
                volume: AtomicU32::new(DEFAULT_VOLUME),
                speed: AtomicU32::new(DEFAULT_SPEED),
                state: Mutex::new(PlaybackState::default()),
                chunk_samples: config.chunk_samples.max(1),
                poll_interval: config.poll_interval(),
            }),
            worker: Mutex::new(None),
            stop_timeout: config.stop_timeout(),
        }
    }

    /// Queue a task without blocking.
    ///
    /// Returns `false` (and logs a warning) if the task is malformed or the
    /// queue is at capacity.
    pub fn add_task(&self, task: PlaybackTask) -> bool {
        if let Err(e) = task.validate() {
            tracing::warn!(label = %task.label, error = %e, "Rejected malformed playback task");
            return false;
        }
        match self.shared.queue.try_push(task) {
            Ok(()) => true,
            Err(task) => {
                tracing::warn!(
                    label = %task.label,
                    capacity = self.shared.queue.capacity(),
                    "Playback queue full, dropping task"
                );
                false
            }
        }
    }

    /// Spawn the worker thread. Does nothing if it is already running.
    pub fn start(&self) -> Result<(), VoiceError> {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("rollcall-playback".into())
            .spawn(move || shared.run(&token))
            .map_err(|e| VoiceError::Worker(format!("failed to spawn playback thread: {e}")))?;

        *worker = Some(Worker { handle, cancel });
        tracing::debug!("Playback worker started");
        Ok(())
    }

    /// Stop the worker, clear the queue and reset state.
    ///
    /// `wait` bounds the join; `None` waits for the worker to exit. A worker
    /// that outlives the bound is detached and exits at its next chunk
    /// boundary. After this returns, [`start`](Self::start) may be called
    /// again.
    pub fn stop(&self, wait: Option<Duration>) {
        let worker = self.lock_worker().take();

        if let Some(Worker { handle, cancel }) = worker {
            cancel.cancel();
            self.shared.queue.wake();
            join_worker(handle, wait);
        }

        let dropped = self.shared.queue.clear();
        self.shared.lock_state().current = None;
        tracing::debug!(dropped, "Playback stopped");
    }

    /// Whether the worker thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Force the queue capacity until the worker next dequeues.
    pub fn set_capacity(&self, capacity: usize) {
        self.shared.queue.set_capacity(capacity);
    }

    /// Output volume in percent, clamped to `0..=100`.
    pub fn set_volume(&self, volume: u32) {
        self.shared
            .volume
            .store(volume.min(MAX_VOLUME), Ordering::Relaxed);
    }

    /// Playback speed in percent, clamped to `0..=200`.
    pub fn set_speed(&self, speed: u32) {
        self.shared.speed.store(speed.min(MAX_SPEED), Ordering::Relaxed);
    }

    #[must_use]
    pub fn status(&self) -> PlaybackStatus {
        let (current, last_error) = {
            let state = self.shared.lock_state();
            (state.current.clone(), state.last_error.clone())
        };
        PlaybackStatus {
            running: self.is_running(),
            queued: self.shared.queue.len(),
            capacity: self.shared.queue.capacity(),
            current,
            last_error,
            volume: self.shared.volume.load(Ordering::Relaxed),
            speed: self.shared.speed.load(Ordering::Relaxed),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for VoicePlaybackSystem {
    fn drop(&mut self) {
        self.stop(Some(self.stop_timeout));
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let Some(task) = self.queue.pop_timeout(self.poll_interval) else {
                continue;
            };
            if cancel.is_cancelled() {
                break;
            }

            self.queue.set_capacity(self.balancer.get_optimal_queue_size());

            let label = task.label.clone();
            self.lock_state().current = Some(label.clone());

            match self.play(task, cancel) {
                Ok(()) => tracing::debug!(label = %label, "Finished playback task"),
                Err(VoiceError::Cancelled) => {
                    tracing::debug!(label = %label, "Playback task cancelled");
                }
                Err(e) => {
                    tracing::warn!(label = %label, error = %e, "Playback task failed");
                    self.lock_state().last_error = Some(e.to_string());
                }
            }

            self.lock_state().current = None;
        }
        tracing::debug!("Playback worker exiting");
    }

    fn play(&self, task: PlaybackTask, cancel: &CancellationToken) -> Result<(), VoiceError> {
        let audio = task.into_audio()?;
        let speed = self.speed.load(Ordering::Relaxed);
        let gain = self.volume.load(Ordering::Relaxed) as f32 / 100.0;
        let rate = playback_rate(audio.sample_rate, speed)?;

        let mut stream = self.output.open(rate)?;
        for chunk in audio.samples.chunks(self.chunk_samples) {
            if cancel.is_cancelled() {
                stream.abort();
                return Err(VoiceError::Cancelled);
            }
            let scaled: Vec<f32> = chunk.iter().map(|s| s * gain).collect();
            if let Err(e) = stream.write(&scaled, cancel) {
                stream.abort();
                return Err(e);
            }
        }
        stream.drain(cancel)
    }
}

/// Device rate for `sample_rate` played at `speed` percent.
///
/// Speed is applied by resampling, so pitch shifts with tempo.
fn playback_rate(sample_rate: u32, speed: u32) -> Result<u32, VoiceError> {
    let rate = u64::from(sample_rate) * u64::from(speed) / 100;
    match u32::try_from(rate) {
        Ok(0) => Err(VoiceError::Playback(format!(
            "speed {speed}% gives a zero output rate"
        ))),
        Ok(rate) => Ok(rate),
        Err(_) => Err(VoiceError::Playback(format!(
            "output rate {rate} Hz out of range"
        ))),
    }
}

fn join_worker(handle: JoinHandle<()>, wait: Option<Duration>) {
    if let Some(limit) = wait {
        let deadline = Instant::now() + limit;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = limit.as_millis(),
                    "Playback worker did not stop in time, detaching"
                );
                return;
            }
            thread::sleep(JOIN_POLL);
        }
    }
    if handle.join().is_err() {
        tracing::warn!("Playback worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_rate() {
        assert_eq!(playback_rate(24_000, 100).unwrap(), 24_000);
        assert_eq!(playback_rate(24_000, 50).unwrap(), 12_000);
        assert_eq!(playback_rate(24_000, 200).unwrap(), 48_000);
        assert!(playback_rate(24_000, 0).is_err());
    }
}
