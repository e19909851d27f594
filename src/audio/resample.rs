//! Sample-rate conversion and channel mixing.
//!
//! 1. [`stereo_to_mono`]: downmix any number of interleaved channels to mono.
//! 2. [`resample`]: band-limited sinc resampling via `rubato`
//!    (`SincFixedIn` + `BlackmanHarris2` window).
//!
//! The resampler's group delay is trimmed off so the output lines up with
//! the input and has `round(len * target / source)` samples.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::audio::AudioBuffer;
use crate::error::{Result, VoiceError};

/// Input frames handed to rubato per `process` call.
const CHUNK_FRAMES: usize = 1024;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use voice_clone::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample a mono `buffer` to `target_rate` Hz.
///
/// * Same rate → the buffer is cloned unchanged.
/// * Empty buffer → empty buffer at the target rate.
///
/// # Errors
///
/// [`VoiceError::UnsupportedAudioFormat`] for a zero rate, a multi-channel
/// buffer, or a resampler construction/processing failure.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if buffer.channels != 1 {
        return Err(VoiceError::UnsupportedAudioFormat(format!(
            "resampling expects mono audio, got {} channels",
            buffer.channels
        )));
    }
    if buffer.sample_rate == target_rate {
        return Ok(buffer.clone());
    }
    if buffer.sample_rate == 0 || target_rate == 0 {
        return Err(VoiceError::UnsupportedAudioFormat(format!(
            "cannot resample {} Hz -> {} Hz",
            buffer.sample_rate, target_rate
        )));
    }
    if buffer.is_empty() {
        return Ok(AudioBuffer::mono(Vec::new(), target_rate));
    }

    let input = buffer.to_f32();
    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    let expected = (input.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_FRAMES, 1)
        .map_err(|e| VoiceError::UnsupportedAudioFormat(format!("resampler: {e}")))?;

    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay);
    let process_err = |e: rubato::ResampleError| {
        VoiceError::UnsupportedAudioFormat(format!("resampling failed: {e}"))
    };

    let mut pos = 0;
    while input.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let frames = resampler
            .process(&[&input[pos..pos + n]], None)
            .map_err(process_err)?;
        out.extend_from_slice(&frames[0]);
        pos += n;
    }
    if pos < input.len() {
        let frames = resampler
            .process_partial(Some(&[&input[pos..]]), None)
            .map_err(process_err)?;
        out.extend_from_slice(&frames[0]);
    }
    // Flush the filter tail until the delayed signal is complete.
    while out.len() < expected + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(process_err)?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    let mut aligned: Vec<f32> = out.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);

    Ok(AudioBuffer::from_f32(&aligned, target_rate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, secs: f32, amp: f32) -> AudioBuffer {
        let n = (rate as f32 * secs) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect();
        AudioBuffer::from_f32(&samples, rate)
    }

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- resample ----------------------------------------------------------

    #[test]
    fn same_rate_is_noop() {
        let buf = sine(440.0, 22_050, 0.1, 0.5);
        assert_eq!(resample(&buf, 22_050).unwrap(), buf);
    }

    #[test]
    fn empty_input() {
        let out = resample(&AudioBuffer::mono(Vec::new(), 48_000), 22_050).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.sample_rate, 22_050);
    }

    #[test]
    fn downsample_output_length() {
        let buf = sine(440.0, 48_000, 0.5, 0.5);
        let out = resample(&buf, 16_000).unwrap();
        assert_eq!(out.sample_rate, 16_000);
        assert_eq!(out.len(), 8_000);
    }

    #[test]
    fn upsample_output_length() {
        let buf = sine(220.0, 8_000, 0.25, 0.5);
        let out = resample(&buf, 16_000).unwrap();
        assert_eq!(out.len(), 4_000);
    }

    #[test]
    fn tone_amplitude_survives() {
        let buf = sine(300.0, 44_100, 0.5, 0.5);
        let out = resample(&buf, 22_050).unwrap();
        // Ignore the edges, where the filter ramps in and out.
        let mid = &out.samples[2_000..out.len() - 2_000];
        let peak = mid.iter().map(|&s| (s as i32).abs()).max().unwrap();
        let expected = (0.5 * 32_768.0) as i32;
        assert!(
            (peak - expected).abs() < expected / 20,
            "peak {peak} vs {expected}"
        );
    }

    #[test]
    fn stereo_buffer_rejected() {
        let buf = AudioBuffer {
            samples: vec![0; 100],
            sample_rate: 44_100,
            channels: 2,
        };
        let err = resample(&buf, 22_050).unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)));
    }

    #[test]
    fn stereo_buffer_rejected_at_same_rate() {
        let buf = AudioBuffer {
            samples: vec![0; 100],
            sample_rate: 22_050,
            channels: 2,
        };
        let err = resample(&buf, 22_050).unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)));
    }
}
