//! `TtsHandler`: the façade the host calls to announce a result list.
//!
//! One call to [`TtsHandler::voice_play`] is one *run*. The handler
//! validates the request, resolves each name to an utterance, stops the
//! previous run's audible output, and then hands the utterances to one of
//! two engines:
//!
//! - **network**: a single job on the handler's worker pool resolves each
//!   utterance through the [`VoiceCacheManager`] and enqueues it on the
//!   [`VoicePlaybackSystem`] in order.
//! - **local**: a single blocking job speaks each utterance through the
//!   shared [`LocalSpeechEngine`], serialised behind a mutex.
//!
//! # Failure model
//!
//! Nothing here returns an error to the caller. Invalid requests are logged
//! and ignored; per-utterance failures are logged and skipped.
//!
//! # Runs do not fence each other
//!
//! A network job from an earlier run that is still synthesizing when a new
//! run starts is not cancelled; whatever it resolves afterwards lands in the
//! new run's queue.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rollcall_core::{
    AnnouncementToggle, EngineKind, NameSettingsPort, NoNameSettings, NoopVolumeHook, RunConfig,
    SettingsError, StaticToggle, SystemVolumePort, parse_names, parse_run_config,
    resolve_utterance, validate_run_config,
};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, VoiceCacheManager};
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::load::{LoadBalancer, LoadProbe, SysinfoProbe};
use crate::local::{CommandSpeechEngine, LocalSpeech, LocalSpeechEngine};
use crate::playback::{AudioOutput, PlaybackStatus, PlaybackTask, RodioOutput, VoicePlaybackSystem};
use crate::provider::{HttpSpeechProvider, SpeechProvider};

// ── Status ─────────────────────────────────────────────────────────────────────

/// Snapshot of the whole subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct TtsStatus {
    pub enabled: bool,
    pub local_engine: bool,
    pub playback: PlaybackStatus,
    pub cache: CacheStats,
}

/// Completion signal for one run's job.
///
/// For network runs the job is done once every utterance has been resolved
/// and handed to the playback queue; playback itself may still be going.
/// For local runs it is done once the last utterance has been spoken.
pub struct RunHandle {
    engine: EngineKind,
    utterances: usize,
    done: mpsc::Receiver<()>,
}

impl RunHandle {
    #[must_use]
    pub const fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Number of utterances in the run.
    #[must_use]
    pub const fn utterances(&self) -> usize {
        self.utterances
    }

    /// Block until the job finishes or `timeout` elapses. Returns whether
    /// the job finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected)
        )
    }
}

// ── Local engine slot ──────────────────────────────────────────────────────────

/// The one local engine, plus the lock that serialises `say`.
///
/// `stop` is called without the lock so it can interrupt an
/// in-progress `say`.
struct LocalSlot {
    engine: Arc<dyn LocalSpeechEngine>,
    speaking: Mutex<()>,
}

enum LocalChoice {
    Detect,
    Engine(Arc<dyn LocalSpeechEngine>),
    Disabled,
}

// ── Builder ────────────────────────────────────────────────────────────────────

/// Assembles a [`TtsHandler`]. Every collaborator has a production default.
pub struct TtsHandlerBuilder {
    config: VoiceConfig,
    provider: Option<Arc<dyn SpeechProvider>>,
    output: Option<Arc<dyn AudioOutput>>,
    probe: Option<Arc<dyn LoadProbe>>,
    local: LocalChoice,
    names: Arc<dyn NameSettingsPort>,
    toggle: Arc<dyn AnnouncementToggle>,
    volume_hook: Arc<dyn SystemVolumePort>,
}

impl TtsHandlerBuilder {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            provider: None,
            output: None,
            probe: None,
            local: LocalChoice::Detect,
            names: Arc::new(NoNameSettings),
            toggle: Arc::new(StaticToggle::default()),
            volume_hook: Arc::new(NoopVolumeHook),
        }
    }

    /// Network provider. Defaults to [`HttpSpeechProvider`] on
    /// `config.provider`.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Output device. Defaults to [`RodioOutput`].
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    /// Load probe for queue sizing. Defaults to [`SysinfoProbe`].
    #[must_use]
    pub fn with_load_probe(mut self, probe: Arc<dyn LoadProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Local engine. Defaults to whatever [`CommandSpeechEngine::detect`]
    /// finds.
    #[must_use]
    pub fn with_local_engine(mut self, engine: Arc<dyn LocalSpeechEngine>) -> Self {
        self.local = LocalChoice::Engine(engine);
        self
    }

    /// Build without a local engine; local runs are logged and ignored.
    #[must_use]
    pub fn without_local_engine(mut self) -> Self {
        self.local = LocalChoice::Disabled;
        self
    }

    #[must_use]
    pub fn with_name_settings(mut self, names: Arc<dyn NameSettingsPort>) -> Self {
        self.names = names;
        self
    }

    #[must_use]
    pub fn with_toggle(mut self, toggle: Arc<dyn AnnouncementToggle>) -> Self {
        self.toggle = toggle;
        self
    }

    #[must_use]
    pub fn with_volume_hook(mut self, hook: Arc<dyn SystemVolumePort>) -> Self {
        self.volume_hook = hook;
        self
    }

    pub fn build(self) -> Result<TtsHandler, VoiceError> {
        self.config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.pool_workers)
            .thread_name("rollcall-tts")
            .enable_all()
            .build()
            .map_err(|e| VoiceError::Worker(format!("failed to build worker pool: {e}")))?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(HttpSpeechProvider::new(self.config.provider.clone())?),
        };
        let cache = Arc::new(VoiceCacheManager::new(&self.config, provider)?);

        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SysinfoProbe::new()));
        let output = self.output.unwrap_or_else(|| Arc::new(RodioOutput));
        let playback = Arc::new(VoicePlaybackSystem::new(
            output,
            LoadBalancer::new(probe),
            &self.config,
        ));

        let local = match self.local {
            LocalChoice::Engine(engine) => Some(engine),
            LocalChoice::Disabled => None,
            LocalChoice::Detect => match CommandSpeechEngine::detect() {
                Ok(engine) => Some(Arc::new(engine) as Arc<dyn LocalSpeechEngine>),
                Err(e) => {
                    tracing::info!(error = %e, "Local announcements disabled");
                    None
                }
            },
        };

        tracing::info!(
            cache_dir = %cache.cache_dir().display(),
            workers = self.config.pool_workers,
            local_engine = local.is_some(),
            "TTS handler ready"
        );

        Ok(TtsHandler {
            runtime: Some(runtime),
            cache,
            playback,
            local: local.map(|engine| {
                Arc::new(LocalSlot {
                    engine,
                    speaking: Mutex::new(()),
                })
            }),
            local_run: Mutex::new(CancellationToken::new()),
            names: self.names,
            toggle: self.toggle,
            volume_hook: self.volume_hook,
            stop_timeout: self.config.stop_timeout(),
        })
    }
}

// ── Handler ────────────────────────────────────────────────────────────────────

/// Entry point for announcing result lists.
pub struct TtsHandler {
    /// `None` only during drop.
    runtime: Option<Runtime>,
    cache: Arc<VoiceCacheManager>,
    playback: Arc<VoicePlaybackSystem>,
    local: Option<Arc<LocalSlot>>,
    /// Cancelled when a new run (or `stop`) supersedes the current local run.
    local_run: Mutex<CancellationToken>,
    names: Arc<dyn NameSettingsPort>,
    toggle: Arc<dyn AnnouncementToggle>,
    volume_hook: Arc<dyn SystemVolumePort>,
    stop_timeout: Duration,
}

impl TtsHandler {
    /// Handler with production defaults for every collaborator.
    pub fn new(config: VoiceConfig) -> Result<Self, VoiceError> {
        TtsHandlerBuilder::new(config).build()
    }

    pub fn builder(config: VoiceConfig) -> TtsHandlerBuilder {
        TtsHandlerBuilder::new(config)
    }

    /// Announce `names` in order.
    ///
    /// Returns immediately. `None` means no run was started: the request was
    /// invalid, announcements are disabled, or there was nothing to say.
    /// The reason is logged.
    pub fn voice_play(
        &self,
        config: &RunConfig,
        names: &[String],
        engine_type: &str,
        voice_name: &str,
        context: &str,
    ) -> Option<RunHandle> {
        match self.try_voice_play(config, names, engine_type, voice_name, context) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(engine = engine_type, error = %e, "Announcement run skipped");
                None
            }
        }
    }

    /// [`voice_play`](Self::voice_play) for hosts holding untyped settings.
    ///
    /// `config` must be a JSON object and `names` a JSON array of strings.
    pub fn voice_play_value(
        &self,
        config: &Value,
        names: &Value,
        engine_type: &str,
        voice_name: &str,
        context: &str,
    ) -> Option<RunHandle> {
        let parsed = parse_run_config(config).and_then(|c| Ok((c, parse_names(names)?)));
        match parsed {
            Ok((config, names)) => self.voice_play(&config, &names, engine_type, voice_name, context),
            Err(e) => {
                tracing::warn!(error = %e, "Announcement run skipped");
                None
            }
        }
    }

    /// Silence everything: cancel the local run, stop the local engine and
    /// stop playback. The playback join is bounded by `stop_timeout_ms`.
    pub fn stop(&self) {
        self.lock_local_run().cancel();
        if let Some(local) = &self.local {
            local.engine.stop();
        }
        self.playback.stop(Some(self.stop_timeout));
    }

    /// Stop playback and wait up to `wait` for background cache writes.
    ///
    /// Returns whether every pending write finished in time.
    pub fn shutdown(&self, wait: Duration) -> bool {
        self.stop();

        let Ok(handle) = self.handle() else {
            return true;
        };
        let (tx, rx) = mpsc::channel();
        let cache = Arc::clone(&self.cache);
        handle.spawn(async move {
            cache.flush().await;
            let _ = tx.send(());
        });

        let flushed = rx.recv_timeout(wait).is_ok();
        if !flushed {
            tracing::warn!(
                wait_ms = wait.as_millis(),
                "Voice cache writes still pending at shutdown"
            );
        }
        flushed
    }

    #[must_use]
    pub fn status(&self) -> TtsStatus {
        TtsStatus {
            enabled: self.toggle.is_enabled(),
            local_engine: self.local.is_some(),
            playback: self.playback.status(),
            cache: self.cache.stats(),
        }
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The cache backing network runs.
    #[must_use]
    pub fn cache(&self) -> &VoiceCacheManager {
        &self.cache
    }

    /// The playback system backing network runs.
    #[must_use]
    pub fn playback(&self) -> &VoicePlaybackSystem {
        &self.playback
    }

    fn try_voice_play(
        &self,
        config: &RunConfig,
        names: &[String],
        engine_type: &str,
        voice_name: &str,
        context: &str,
    ) -> Result<Option<RunHandle>, VoiceError> {
        validate_run_config(config)?;
        let engine: EngineKind = engine_type.parse()?;
        if engine == EngineKind::Network && voice_name.trim().is_empty() {
            return Err(SettingsError::EmptyVoice.into());
        }

        if !self.toggle.is_enabled() {
            tracing::debug!("Announcements disabled, ignoring run");
            return Ok(None);
        }

        // Silence the previous run before anything of this one can play.
        self.stop();

        let utterances: Vec<String> = names
            .iter()
            .map(|name| resolve_utterance(self.names.as_ref(), context, name))
            .filter(|text| !text.trim().is_empty())
            .collect();
        if utterances.is_empty() {
            tracing::debug!(context, "Nothing to announce");
            return Ok(None);
        }

        if let Err(e) = self.volume_hook.apply_output_volume() {
            tracing::debug!(error = %e, "System volume hook failed");
        }

        tracing::info!(
            engine = %engine,
            voice = voice_name,
            context,
            count = utterances.len(),
            "Starting announcement run"
        );

        let handle = match engine {
            EngineKind::Network => self.spawn_network_run(config, utterances, voice_name)?,
            EngineKind::Local => self.spawn_local_run(config, utterances, voice_name)?,
        };
        Ok(Some(handle))
    }

    fn spawn_network_run(
        &self,
        config: &RunConfig,
        utterances: Vec<String>,
        voice: &str,
    ) -> Result<RunHandle, VoiceError> {
        let handle = self.handle()?;
        self.playback.set_volume(config.volume);
        self.playback.set_speed(config.speed);
        self.playback.start()?;

        let count = utterances.len();
        let (tx, rx) = mpsc::channel();
        let cache = Arc::clone(&self.cache);
        let playback = Arc::clone(&self.playback);
        let voice = voice.to_string();

        handle.spawn(async move {
            for text in utterances {
                match cache.get_voice(&text, &voice).await {
                    Ok(audio) => {
                        playback.add_task(PlaybackTask::pcm(text, audio));
                    }
                    Err(e) => {
                        tracing::warn!(utterance = %text, voice = %voice, error = %e, "Skipping utterance");
                    }
                }
            }
            let _ = tx.send(());
        });

        Ok(RunHandle {
            engine: EngineKind::Network,
            utterances: count,
            done: rx,
        })
    }

    fn spawn_local_run(
        &self,
        config: &RunConfig,
        utterances: Vec<String>,
        voice: &str,
    ) -> Result<RunHandle, VoiceError> {
        let local = self
            .local
            .as_ref()
            .map(Arc::clone)
            .ok_or(VoiceError::LocalEngineUnavailable)?;
        let handle = self.handle()?;

        let token = CancellationToken::new();
        *self.lock_local_run() = token.clone();

        let speech = LocalSpeech {
            voice: Some(voice.to_string()).filter(|v| !v.trim().is_empty()),
            volume: config.volume,
            speed: config.speed,
        };
        let count = utterances.len();
        let (tx, rx) = mpsc::channel();

        handle.spawn_blocking(move || {
            let _speaking = local
                .speaking
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for text in utterances {
                if token.is_cancelled() {
                    tracing::debug!("Local run superseded");
                    break;
                }
                match local.engine.say(&text, &speech, &token) {
                    Ok(()) => {}
                    Err(VoiceError::Cancelled) => {
                        tracing::debug!(utterance = %text, "Local utterance interrupted");
                    }
                    Err(e) => {
                        tracing::warn!(utterance = %text, error = %e, "Local engine failed, skipping");
                    }
                }
            }
            let _ = tx.send(());
        });

        Ok(RunHandle {
            engine: EngineKind::Local,
            utterances: count,
            done: rx,
        })
    }

    fn handle(&self) -> Result<&Handle, VoiceError> {
        self.runtime
            .as_ref()
            .map(Runtime::handle)
            .ok_or_else(|| VoiceError::Worker("worker pool shut down".into()))
    }

    fn lock_local_run(&self) -> MutexGuard<'_, CancellationToken> {
        self.local_run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TtsHandler {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
