//! WAV file import/export via `hound`.
//!
//! Imported files may have any channel count and any integer or float
//! sample format; they are downmixed to mono and converted to 16-bit.
//! Exported files are always 16-bit PCM mono.

use std::path::Path;

use crate::audio::{stereo_to_mono, AudioBuffer};
use crate::error::{Result, VoiceError};

/// Read `path` into a mono [`AudioBuffer`] at the file's own sample rate.
///
/// # Errors
///
/// [`VoiceError::UnsupportedAudioFormat`] when the file cannot be opened or
/// decoded, or uses a bit depth above 32.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        VoiceError::UnsupportedAudioFormat(format!("{}: {e}", path.display()))
    })?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VoiceError::UnsupportedAudioFormat(e.to_string()))?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(VoiceError::UnsupportedAudioFormat(format!(
                    "{}-bit integer WAV is not supported",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| VoiceError::UnsupportedAudioFormat(e.to_string()))?
        }
    };

    let mono = stereo_to_mono(&interleaved, spec.channels);
    log::debug!(
        "read {}: {} Hz, {} ch, {}-bit -> {} mono samples",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        mono.len()
    );
    Ok(AudioBuffer::from_f32(&mono, spec.sample_rate))
}

/// Write `buffer` to `path` as 16-bit PCM.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let io_err = |e: hound::Error| VoiceError::Storage(format!("{}: {e}", path.display()));
    let mut writer = hound::WavWriter::create(path, spec).map_err(io_err)?;
    for &s in &buffer.samples {
        writer.write_sample(s).map_err(io_err)?;
    }
    writer.finalize().map_err(io_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
