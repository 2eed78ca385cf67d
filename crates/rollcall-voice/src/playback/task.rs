use std::path::PathBuf;

use crate::audio::{PcmAudio, read_wav_file};
use crate::error::VoiceError;

/// Where a task's audio comes from.
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    /// Already-decoded samples.
    Pcm(PcmAudio),
    /// A WAV file, decoded by the worker when the task is dequeued.
    File(PathBuf),
}

/// One unit of work for the playback worker. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct PlaybackTask {
    /// Shown in status snapshots and logs.
    pub label: String,
    pub source: PlaybackSource,
}

impl PlaybackTask {
    pub fn pcm(label: impl Into<String>, audio: PcmAudio) -> Self {
        Self {
            label: label.into(),
            source: PlaybackSource::Pcm(audio),
        }
    }

    pub fn file(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            source: PlaybackSource::File(path.into()),
        }
    }

    /// Shape check performed before the task is queued.
    pub fn validate(&self) -> Result<(), VoiceError> {
        match &self.source {
            PlaybackSource::Pcm(audio) if audio.samples.is_empty() => {
                Err(VoiceError::Validation("task has no samples".into()))
            }
            PlaybackSource::Pcm(audio) if audio.sample_rate == 0 => {
                Err(VoiceError::Validation("task sample rate is zero".into()))
            }
            PlaybackSource::File(path) if path.as_os_str().is_empty() => {
                Err(VoiceError::Validation("task file path is empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// Resolve the task to samples, reading the file if needed.
    pub fn into_audio(self) -> Result<PcmAudio, VoiceError> {
        let audio = match self.source {
            PlaybackSource::Pcm(audio) => audio,
            PlaybackSource::File(path) => read_wav_file(&path)?,
        };
        if audio.is_empty() {
            return Err(VoiceError::EmptyAudio);
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav_file;

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(
            PlaybackTask::pcm("x", PcmAudio::new(Vec::new(), 16_000))
                .validate()
                .is_err()
        );
        assert!(
            PlaybackTask::pcm("x", PcmAudio::new(vec![0.1], 0))
                .validate()
                .is_err()
        );
        assert!(PlaybackTask::file("x", "").validate().is_err());
        assert!(
            PlaybackTask::pcm("x", PcmAudio::new(vec![0.1], 16_000))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_file_task_reads_wav() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.wav");
        let audio = PcmAudio::new(vec![0.25, -0.25], 22_050);
        write_wav_file(&path, &audio).unwrap();

        let task = PlaybackTask::file("clip", &path);
        assert!(task.validate().is_ok());
        assert_eq!(task.into_audio().unwrap(), audio);
    }

    #[test]
    fn test_missing_file_errors_at_resolve() {
        let task = PlaybackTask::file("gone", "/nonexistent/rollcall/clip.wav");
        assert!(task.validate().is_ok());
        assert!(matches!(
            task.into_audio(),
            Err(VoiceError::AudioFileNotFound(_))
        ));
    }
}
