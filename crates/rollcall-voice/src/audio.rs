//! Decoded PCM audio and WAV conversion.
//!
//! Everything inside the subsystem moves audio around as [`PcmAudio`]: mono
//! `f32` samples plus a sample rate. The sample buffer is reference-counted
//! so the memory cache and the playback queue share one allocation.

use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::VoiceError;

/// Decoded mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    /// Mono samples in `[-1.0, 1.0]`.
    pub samples: Arc<[f32]>,

    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Whether there is nothing to play.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() || self.sample_rate == 0
    }

    /// Playback duration at the native sample rate.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode WAV bytes into mono PCM.
///
/// Integer formats are normalised to `[-1.0, 1.0]`; multi-channel input is
/// downmixed by averaging each frame.
pub fn decode_wav(bytes: &[u8]) -> Result<PcmAudio, VoiceError> {
    decode_reader(WavReader::new(Cursor::new(bytes))?)
}

/// Read a WAV file from disk into mono PCM.
pub fn read_wav_file(path: &Path) -> Result<PcmAudio, VoiceError> {
    if !path.exists() {
        return Err(VoiceError::AudioFileNotFound(path.to_path_buf()));
    }
    decode_reader(WavReader::open(path)?)
}

/// Write mono PCM to a 32-bit float WAV file.
///
/// Float samples keep the cached copy bit-identical to what the provider
/// returned.
pub fn write_wav_file(path: &Path, audio: &PcmAudio) -> Result<(), VoiceError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in audio.samples.iter() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn decode_reader<R: Read + Seek>(mut reader: WavReader<R>) -> Result<PcmAudio, VoiceError> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(VoiceError::AudioCodec("WAV header declares zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let channels = usize::from(spec.channels);
    let samples: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(PcmAudio::new(samples, spec.sample_rate))
}
