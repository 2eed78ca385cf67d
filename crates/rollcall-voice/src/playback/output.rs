//! Output device seam.
//!
//! The worker opens one [`PlaybackStream`] per task on its own thread and
//! drops it when the task ends. `rodio::OutputStream` is `!Send` on some
//! platforms, so streams never leave the thread that opened them; only the
//! [`AudioOutput`] factory is shared.

use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;

/// Factory for mono output streams.
pub trait AudioOutput: Send + Sync {
    /// Open a mono stream rendering at `sample_rate` Hz.
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>, VoiceError>;
}

/// A mono output stream owned by the playback worker.
pub trait PlaybackStream {
    /// Hand one chunk of samples to the device.
    ///
    /// May block while the device is backed up. Returns
    /// [`VoiceError::Cancelled`] if `cancel` fires while blocked, after
    /// silencing the device.
    fn write(&mut self, chunk: &[f32], cancel: &CancellationToken) -> Result<(), VoiceError>;

    /// Block until everything written has been played.
    ///
    /// Returns [`VoiceError::Cancelled`] if `cancel` fires first, after
    /// silencing the device.
    fn drain(&mut self, cancel: &CancellationToken) -> Result<(), VoiceError>;

    /// Silence the device immediately, discarding pending audio.
    fn abort(&mut self);
}

/// Chunks buffered in the sink ahead of the one playing.
const MAX_PENDING_CHUNKS: usize = 2;

const WRITE_POLL: Duration = Duration::from_millis(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// [`AudioOutput`] on the default system device via `rodio`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>, VoiceError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        let sink =
            Sink::try_new(&handle).map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;

        tracing::trace!(sample_rate, "Opened output stream");
        Ok(Box::new(RodioStream {
            _stream: stream,
            sink,
            sample_rate,
        }))
    }
}

struct RodioStream {
    /// Must outlive the sink.
    _stream: OutputStream,
    sink: Sink,
    sample_rate: u32,
}

impl PlaybackStream for RodioStream {
    fn write(&mut self, chunk: &[f32], cancel: &CancellationToken) -> Result<(), VoiceError> {
        while self.sink.len() >= MAX_PENDING_CHUNKS {
            if cancel.is_cancelled() {
                self.sink.stop();
                return Err(VoiceError::Cancelled);
            }
            thread::sleep(WRITE_POLL);
        }
        self.sink
            .append(SamplesBuffer::new(1, self.sample_rate, chunk.to_vec()));
        Ok(())
    }

    fn drain(&mut self, cancel: &CancellationToken) -> Result<(), VoiceError> {
        while !self.sink.empty() {
            if cancel.is_cancelled() {
                self.sink.stop();
                return Err(VoiceError::Cancelled);
            }
            thread::sleep(DRAIN_POLL);
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.sink.stop();
    }
}
