//! On-device speech engine.
//!
//! The local engine is synchronous and not safe for concurrent use, so the
//! handler owns exactly one and serialises every `say` behind a mutex.
//! [`CommandSpeechEngine`] shells out to whichever speech CLI is installed.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;

/// Per-utterance settings for the local engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSpeech {
    /// Engine-specific voice name; `None` uses the engine default.
    pub voice: Option<String>,
    /// Percent, `0..=100`.
    pub volume: u32,
    /// Percent, `0..=200`.
    pub speed: u32,
}

impl Default for LocalSpeech {
    fn default() -> Self {
        Self {
            voice: None,
            volume: rollcall_core::DEFAULT_VOLUME,
            speed: rollcall_core::DEFAULT_SPEED,
        }
    }
}

/// Synchronous on-device synthesizer.
pub trait LocalSpeechEngine: Send + Sync {
    /// Speak `text`, blocking until it has been played, [`stop`] is
    /// called, or `cancel` fires.
    ///
    /// Once the utterance is audible `cancel` must be observed, so a `stop`
    /// that raced ahead of it cannot leave the utterance playing.
    ///
    /// [`stop`]: LocalSpeechEngine::stop
    fn say(
        &self,
        text: &str,
        speech: &LocalSpeech,
        cancel: &CancellationToken,
    ) -> Result<(), VoiceError>;

    /// Interrupt the current utterance, if any. Must not block on `say`.
    fn stop(&self);
}

/// Words per minute at 100% speed.
const BASE_WPM: u32 = 175;
const MIN_WPM: u32 = 80;
const MAX_WPM: u32 = 450;

const CHILD_POLL: Duration = Duration::from_millis(20);

/// Spawns retried when the binary is momentarily busy (ETXTBSY).
const SPAWN_ATTEMPTS: u32 = 3;
const SPAWN_RETRY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Espeak,
    MacSay,
}

/// [`LocalSpeechEngine`] backed by `espeak-ng`, `espeak` or macOS `say`.
pub struct CommandSpeechEngine {
    program: PathBuf,
    flavor: Flavor,
    child: Mutex<Option<Child>>,
}

impl CommandSpeechEngine {
    /// Find a speech CLI on `PATH`.
    pub fn detect() -> Result<Self, VoiceError> {
        let found = find_on_path("espeak-ng")
            .or_else(|| find_on_path("espeak"))
            .map(|p| (p, Flavor::Espeak))
            .or_else(|| find_on_path("say").map(|p| (p, Flavor::MacSay)));

        let Some((program, flavor)) = found else {
            return Err(VoiceError::LocalEngineUnavailable);
        };
        tracing::info!(program = %program.display(), "Detected local speech engine");
        Ok(Self {
            program,
            flavor,
            child: Mutex::new(None),
        })
    }

    /// Use a specific espeak-compatible binary.
    pub fn espeak(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            flavor: Flavor::Espeak,
            child: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(cmd: &mut Command) -> Result<Child, VoiceError> {
        let mut attempt = 1;
        loop {
            match cmd.spawn() {
                Ok(child) => return Ok(child),
                Err(e)
                    if e.kind() == std::io::ErrorKind::ExecutableFileBusy
                        && attempt < SPAWN_ATTEMPTS =>
                {
                    attempt += 1;
                    thread::sleep(SPAWN_RETRY);
                }
                Err(e) => {
                    return Err(VoiceError::LocalEngine(format!(
                        "failed to start engine: {e}"
                    )));
                }
            }
        }
    }

    fn command(&self, text: &str, speech: &LocalSpeech) -> Command {
        let mut cmd = Command::new(&self.program);
        let wpm = (BASE_WPM * speech.speed.min(rollcall_core::MAX_SPEED) / 100).clamp(MIN_WPM, MAX_WPM);
        match self.flavor {
            Flavor::Espeak => {
                if let Some(voice) = speech.voice.as_deref().filter(|v| !v.is_empty()) {
                    cmd.arg("-v").arg(voice);
                }
                cmd.arg("-s").arg(wpm.to_string());
                cmd.arg("-a")
                    .arg(speech.volume.min(rollcall_core::MAX_VOLUME).to_string());
            }
            Flavor::MacSay => {
                if let Some(voice) = speech.voice.as_deref().filter(|v| !v.is_empty()) {
                    cmd.arg("-v").arg(voice);
                }
                cmd.arg("-r").arg(wpm.to_string());
            }
        }
        cmd.arg("--").arg(text);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl LocalSpeechEngine for CommandSpeechEngine {
    fn say(
        &self,
        text: &str,
        speech: &LocalSpeech,
        cancel: &CancellationToken,
    ) -> Result<(), VoiceError> {
        if cancel.is_cancelled() {
            return Err(VoiceError::Cancelled);
        }
        let mut cmd = self.command(text, speech);
        tracing::debug!(command = ?cmd, "Running local speech engine");

        {
            let mut slot = self.lock_child();
            if let Some(mut previous) = slot.take() {
                let _ = previous.kill();
                let _ = previous.wait();
            }
            *slot = Some(Self::spawn(&mut cmd)?);
        }

        loop {
            // The child is registered before this check, so either `stop`
            // finds it or the cancellation is seen here.
            if cancel.is_cancelled() {
                self.stop();
                return Err(VoiceError::Cancelled);
            }
            {
                let mut slot = self.lock_child();
                let Some(child) = slot.as_mut() else {
                    return Err(VoiceError::Cancelled);
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        slot.take();
                        return if status.success() {
                            Ok(())
                        } else {
                            Err(VoiceError::LocalEngine(format!("engine exited with {status}")))
                        };
                    }
                    Ok(None) => {}
                    Err(e) => {
                        slot.take();
                        return Err(VoiceError::Io(e));
                    }
                }
            }
            thread::sleep(CHILD_POLL);
        }
    }

    fn stop(&self) {
        if let Some(mut child) = self.lock_child().take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!("Local speech interrupted");
        }
    }
}

fn find_on_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
