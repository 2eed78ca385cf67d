//! Hand-written fakes shared by the integration tests.
//!
//! The fake provider encodes each utterance as a constant sample value so a
//! recorded device write can be traced back to the utterance it came from.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rollcall_voice::{
    AudioOutput, LocalSpeech, LocalSpeechEngine, PcmAudio, PlaybackStream, SpeechProvider,
    VoiceError,
};
use tokio_util::sync::CancellationToken;

pub const SAMPLE_RATE: u32 = 16_000;

/// Sample value the fake provider uses for `text`.
pub fn marker(text: &str) -> f32 {
    match text {
        "Alice" => 0.25,
        "Bob" => 0.5,
        "Carol" => 0.75,
        _ => 0.1,
    }
}

pub fn clip(text: &str, samples: usize) -> PcmAudio {
    PcmAudio::new(vec![marker(text); samples], SAMPLE_RATE)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── Provider ───────────────────────────────────────────────────────

/// Provider returning [`marker`]-valued clips, with scripted failures.
pub struct ScriptedProvider {
    samples: usize,
    failures_left: AtomicU32,
    calls: Mutex<Vec<String>>,
    per_text: Mutex<HashMap<String, u32>>,
}

impl ScriptedProvider {
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            failures_left: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            per_text: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `n` calls with a transport error.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, text: &str) -> u32 {
        self.per_text.lock().unwrap().get(text).copied().unwrap_or(0)
    }

    pub fn received(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for ScriptedProvider {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<PcmAudio, VoiceError> {
        self.calls.lock().unwrap().push(text.to_string());
        *self
            .per_text
            .lock()
            .unwrap()
            .entry(text.to_string())
            .or_default() += 1;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VoiceError::Transport("simulated outage".into()));
        }
        Ok(clip(text, self.samples))
    }
}

// ── Output device ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Open(u32),
    Write(Vec<f32>),
    Drained,
    Abort,
}

/// Output that records every call instead of making sound.
#[derive(Clone, Default)]
pub struct RecordingOutput {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    write_delay: Duration,
    stalled: bool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write take `delay`, like a real device playing it.
    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::default()
        }
    }

    /// Accept one write, then block every later write until cancelled,
    /// like a device whose backlog plays far slower than it is fed.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Value of the first sample of every write, in order.
    pub fn written_markers(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Write(chunk) => chunk.first().copied(),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl AudioOutput for RecordingOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackStream>, VoiceError> {
        self.events.lock().unwrap().push(DeviceEvent::Open(sample_rate));
        Ok(Box::new(RecordingStream {
            events: Arc::clone(&self.events),
            write_delay: self.write_delay,
            stalled: self.stalled,
            written: 0,
        }))
    }
}

struct RecordingStream {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    write_delay: Duration,
    stalled: bool,
    written: usize,
}

impl PlaybackStream for RecordingStream {
    fn write(&mut self, chunk: &[f32], cancel: &CancellationToken) -> Result<(), VoiceError> {
        if self.stalled && self.written > 0 {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            self.abort();
            return Err(VoiceError::Cancelled);
        }
        self.written += 1;
        self.events
            .lock()
            .unwrap()
            .push(DeviceEvent::Write(chunk.to_vec()));
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        Ok(())
    }

    fn drain(&mut self, cancel: &CancellationToken) -> Result<(), VoiceError> {
        if cancel.is_cancelled() {
            self.abort();
            return Err(VoiceError::Cancelled);
        }
        self.events.lock().unwrap().push(DeviceEvent::Drained);
        Ok(())
    }

    fn abort(&mut self) {
        self.events.lock().unwrap().push(DeviceEvent::Abort);
    }
}

/// Output whose device cannot be opened.
pub struct BrokenOutput;

impl AudioOutput for BrokenOutput {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackStream>, VoiceError> {
        Err(VoiceError::OutputStreamError("no device".into()))
    }
}

// ── Local engine ───────────────────────────────────────────────────

/// Local engine that records utterances and takes `delay` per `say`.
pub struct RecordingEngine {
    spoken: Mutex<Vec<(String, LocalSpeech)>>,
    delay: Duration,
    stopped: AtomicBool,
    stops: AtomicU32,
    in_say: AtomicU32,
    max_concurrent: AtomicU32,
}

impl RecordingEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            delay,
            stopped: AtomicBool::new(false),
            stops: AtomicU32::new(0),
            in_say: AtomicU32::new(0),
            max_concurrent: AtomicU32::new(0),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn last_speech(&self) -> Option<LocalSpeech> {
        self.spoken.lock().unwrap().last().map(|(_, s)| s.clone())
    }

    pub fn stop_calls(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl LocalSpeechEngine for RecordingEngine {
    fn say(
        &self,
        text: &str,
        speech: &LocalSpeech,
        cancel: &CancellationToken,
    ) -> Result<(), VoiceError> {
        let now = self.in_say.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + self.delay;
        let mut result = Ok(());
        while Instant::now() < deadline {
            if self.stopped.load(Ordering::SeqCst) || cancel.is_cancelled() {
                result = Err(VoiceError::Cancelled);
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        if result.is_ok() {
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), speech.clone()));
        }

        self.in_say.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}
