//! Unbounded on-disk tier.
//!
//! One WAV file per [`CacheKey`] in a flat directory. Files are never
//! deleted by the subsystem; reads refresh the modification time so an
//! external sweeper could implement age-based retention.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::key::CacheKey;
use crate::audio::{PcmAudio, read_wav_file, write_wav_file};
use crate::error::VoiceError;

/// Aggregate size of the on-disk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub files: u64,
    pub bytes: u64,
}

/// Flat directory of cached WAV files.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl DiskStore {
    /// Open (and create if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, VoiceError> {
        let dir = dir.into();
        rollcall_core::ensure_directory(&dir)?;
        Ok(Self {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the WAV file for `key`.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Load the cached audio for `key`, or `None` if it was never persisted.
    ///
    /// A hit refreshes the file's modification time.
    pub fn load(&self, key: &CacheKey) -> Result<Option<PcmAudio>, VoiceError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }

        let audio = read_wav_file(&path)?;
        if let Err(e) = touch(&path) {
            tracing::debug!(path = %path.display(), error = %e, "Failed to touch cache file");
        }
        Ok(Some(audio))
    }

    /// Persist `audio` for `key`.
    ///
    /// Written to a temporary sibling first and renamed into place, so a
    /// concurrent reader never sees a half-written file. Concurrent writers
    /// of the same key race on the rename; the last one wins.
    pub fn store(&self, key: &CacheKey, audio: &PcmAudio) -> Result<PathBuf, VoiceError> {
        let path = self.path_for(key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.{seq}.tmp", key.as_str(), std::process::id()));

        if let Err(e) = write_wav_file(&tmp, audio) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })?;
        Ok(path)
    }

    /// Count cached files and their total size.
    pub fn usage(&self) -> Result<DiskUsage, VoiceError> {
        let mut usage = DiskUsage::default();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "wav") {
                usage.files += 1;
                usage.bytes += entry.metadata()?.len();
            }
        }
        Ok(usage)
    }
}

fn touch(path: &Path) -> std::io::Result<()> {
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}
