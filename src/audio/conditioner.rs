//! Signal conditioning applied to a voice sample before feature extraction.
//!
//! | Step | Function | Failure policy |
//! |------|----------|----------------|
//! | Peak normalisation | [`normalize`] | infallible; silence passes through |
//! | DC / rumble removal | [`high_pass`] | infallible |
//! | Noise reduction | [`denoise`] | best effort; returns the input on failure |
//! | Rate conversion | [`resample`](crate::audio::resample) | `UnsupportedAudioFormat` |
//! | Joining takes | [`concatenate`] | `UnsupportedAudioFormat` on mismatch |
//!
//! [`SignalConditioner::condition`] chains them in the order the training
//! pipeline expects: resample → high-pass → denoise → normalize.

use std::f32::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

use crate::audio::{resample, AudioBuffer};
use crate::config::AudioConfig;
use crate::error::{Result, VoiceError};

/// Normalised peak as a fraction of full scale.
pub const NORMALIZE_PEAK: f32 = 0.95;

/// Spectral-subtraction window length in samples.
pub const DENOISE_WINDOW: usize = 512;
const DENOISE_HOP: usize = DENOISE_WINDOW / 2;
/// Fraction of the quietest frames averaged into the noise profile.
const NOISE_FRAME_FRACTION: f32 = 0.1;
/// Magnitude never drops below this fraction of the original bin.
const SPECTRAL_FLOOR: f32 = 0.05;

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Scale `buffer` so its peak magnitude is 95 % of full scale.
///
/// A silent buffer (peak 0) is returned unchanged.
pub fn normalize(buffer: &AudioBuffer) -> AudioBuffer {
    let peak = buffer.peak();
    if peak == 0 {
        return buffer.clone();
    }
    let target = NORMALIZE_PEAK * i16::MAX as f32;
    let gain = target / peak as f32;
    let samples = buffer
        .samples
        .iter()
        .map(|&s| (s as f32 * gain).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect();
    AudioBuffer {
        samples,
        ..buffer.clone()
    }
}

// ---------------------------------------------------------------------------
// high_pass
// ---------------------------------------------------------------------------

/// First-order recursive high-pass filter.
///
/// `y[i] = a * (y[i-1] + x[i] - x[i-1])` with `a = RC / (RC + dt)`.  The
/// first sample is passed through as the filter's initial condition.
pub fn high_pass(buffer: &AudioBuffer, cutoff_hz: f32) -> AudioBuffer {
    if buffer.is_empty() || cutoff_hz <= 0.0 || buffer.sample_rate == 0 {
        return buffer.clone();
    }
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / buffer.sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(buffer.len());
    let mut prev_x = buffer.samples[0] as f32;
    let mut prev_y = prev_x;
    out.push(buffer.samples[0]);
    for &s in &buffer.samples[1..] {
        let x = s as f32;
        let y = alpha * (prev_y + x - prev_x);
        out.push(y.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
        prev_x = x;
        prev_y = y;
    }
    AudioBuffer {
        samples: out,
        ..buffer.clone()
    }
}

// ---------------------------------------------------------------------------
// denoise
// ---------------------------------------------------------------------------

/// Internal failures of spectral subtraction.  Never leaves this module.
#[derive(Debug, Error)]
enum DenoiseError {
    #[error("buffer of {len} samples is shorter than one {window}-sample window")]
    TooShort { len: usize, window: usize },
    #[error("non-finite sample produced at index {0}")]
    NonFinite(usize),
}

/// Spectral-subtraction noise reduction.
///
/// Best effort: if the buffer cannot be processed the original buffer is
/// returned and a warning is logged.
pub fn denoise(buffer: &AudioBuffer) -> AudioBuffer {
    match try_denoise(buffer) {
        Ok(cleaned) => cleaned,
        Err(err) => {
            log::warn!("denoise skipped, keeping original audio: {err}");
            buffer.clone()
        }
    }
}

fn try_denoise(buffer: &AudioBuffer) -> std::result::Result<AudioBuffer, DenoiseError> {
    let n = buffer.len();
    if n < DENOISE_WINDOW {
        return Err(DenoiseError::TooShort {
            len: n,
            window: DENOISE_WINDOW,
        });
    }

    // Pad one hop in front so the first real sample sits in two windows,
    // and enough at the back to complete the last frame.
    let mut padded = vec![0.0f32; DENOISE_HOP];
    padded.extend(buffer.to_f32());
    let frames = (padded.len() + DENOISE_HOP - 1) / DENOISE_HOP;
    padded.resize((frames + 1) * DENOISE_HOP, 0.0);
    let num_frames = (padded.len() - DENOISE_WINDOW) / DENOISE_HOP + 1;

    let window: Vec<f32> = (0..DENOISE_WINDOW)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / DENOISE_WINDOW as f32).cos()))
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(DENOISE_WINDOW);
    let inverse = planner.plan_fft_inverse(DENOISE_WINDOW);

    let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(num_frames);
    let mut energies: Vec<f32> = Vec::with_capacity(num_frames);
    for f in 0..num_frames {
        let start = f * DENOISE_HOP;
        let mut frame: Vec<Complex<f32>> = padded[start..start + DENOISE_WINDOW]
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        forward.process(&mut frame);
        energies.push(frame.iter().map(|c| c.norm_sqr()).sum());
        spectra.push(frame);
    }

    // Noise profile: mean magnitude of the quietest frames.
    let mut order: Vec<usize> = (0..num_frames).collect();
    order.sort_by(|&a, &b| energies[a].total_cmp(&energies[b]));
    let quiet = ((num_frames as f32 * NOISE_FRAME_FRACTION) as usize).max(1);
    let mut noise = vec![0.0f32; DENOISE_WINDOW];
    for &f in &order[..quiet] {
        for (acc, c) in noise.iter_mut().zip(&spectra[f]) {
            *acc += c.norm();
        }
    }
    for v in noise.iter_mut() {
        *v /= quiet as f32;
    }

    let mut output = vec![0.0f32; padded.len()];
    let mut weight = vec![0.0f32; padded.len()];
    for (f, spectrum) in spectra.iter_mut().enumerate() {
        for (c, &noise_mag) in spectrum.iter_mut().zip(&noise) {
            let mag = c.norm();
            if mag > 0.0 {
                let cleaned = (mag - noise_mag).max(SPECTRAL_FLOOR * mag);
                *c *= cleaned / mag;
            }
        }
        inverse.process(spectrum);
        let start = f * DENOISE_HOP;
        for (i, c) in spectrum.iter().enumerate() {
            output[start + i] += c.re / DENOISE_WINDOW as f32;
            weight[start + i] += window[i];
        }
    }

    let mut samples = Vec::with_capacity(n);
    for i in DENOISE_HOP..DENOISE_HOP + n {
        let v = if weight[i] > 1e-3 {
            output[i] / weight[i]
        } else {
            output[i]
        };
        if !v.is_finite() {
            return Err(DenoiseError::NonFinite(i - DENOISE_HOP));
        }
        samples.push(v);
    }

    let mut cleaned = AudioBuffer::from_f32(&samples, buffer.sample_rate);
    cleaned.channels = buffer.channels;
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// concatenate
// ---------------------------------------------------------------------------

/// Join `buffers` in order into one buffer.
///
/// # Errors
///
/// [`VoiceError::UnsupportedAudioFormat`] when the list is empty or when
/// sample rates / channel counts differ.
pub fn concatenate(buffers: &[AudioBuffer]) -> Result<AudioBuffer> {
    let first = buffers.first().ok_or_else(|| {
        VoiceError::UnsupportedAudioFormat("nothing to concatenate".into())
    })?;
    for (i, b) in buffers.iter().enumerate().skip(1) {
        if b.sample_rate != first.sample_rate || b.channels != first.channels {
            return Err(VoiceError::UnsupportedAudioFormat(format!(
                "segment {i} is {} Hz / {} ch, expected {} Hz / {} ch",
                b.sample_rate, b.channels, first.sample_rate, first.channels
            )));
        }
    }
    let total = buffers.iter().map(AudioBuffer::len).sum();
    let mut samples = Vec::with_capacity(total);
    for b in buffers {
        samples.extend_from_slice(&b.samples);
    }
    Ok(AudioBuffer {
        samples,
        sample_rate: first.sample_rate,
        channels: first.channels,
    })
}

// ---------------------------------------------------------------------------
// SignalConditioner
// ---------------------------------------------------------------------------

/// The conditioning chain used before training.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    target_rate: u32,
    cutoff_hz: f32,
    denoise: bool,
}

impl SignalConditioner {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            target_rate: config.sample_rate,
            cutoff_hz: config.high_pass_cutoff_hz,
            denoise: config.denoise,
        }
    }

    /// Resample → high-pass → denoise (if enabled) → normalize.
    ///
    /// # Errors
    ///
    /// [`VoiceError::UnsupportedAudioFormat`] for an empty or multi-channel
    /// buffer, or when resampling fails.
    pub fn condition(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        if buffer.is_empty() {
            return Err(VoiceError::UnsupportedAudioFormat(
                "cannot condition an empty buffer".into(),
            ));
        }
        if buffer.channels != 1 {
            return Err(VoiceError::UnsupportedAudioFormat(format!(
                "expected mono audio, got {} channels",
                buffer.channels
            )));
        }
        let resampled = resample(buffer, self.target_rate)?;
        let filtered = high_pass(&resampled, self.cutoff_hz);
        let cleaned = if self.denoise {
            denoise(&filtered)
        } else {
            filtered
        };
        log::debug!(
            "conditioned {} samples @ {} Hz -> {} samples @ {} Hz",
            buffer.len(),
            buffer.sample_rate,
            cleaned.len(),
            cleaned.sample_rate
        );
        Ok(normalize(&cleaned))
    }

    /// Concatenate takes, then run [`condition`](Self::condition).
    pub fn condition_all(&self, takes: &[AudioBuffer]) -> Result<AudioBuffer> {
        let joined = concatenate(takes)?;
        self.condition(&joined)
    }
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
            .map(|i| amp * (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect();
        AudioBuffer::from_f32(&samples, rate)
    }

    /// Deterministic pseudo-noise in `[-amp, amp]`.
    fn noise(n: usize, amp: f32) -> Vec<f32> {
        let mut state = 0x1234_5678u32;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                amp * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
            })
            .collect()
    }

    // ---- normalize ---------------------------------------------------------

    #[test]
    fn normalize_silence_is_unchanged() {
        let buf = AudioBuffer::mono(vec![0; 1_000], 22_050);
        assert_eq!(normalize(&buf), buf);
    }

    #[test]
    fn normalize_reaches_95_percent_peak() {
        let buf = AudioBuffer::mono(vec![100, -400, 250, 0], 22_050);
        let out = normalize(&buf);
        let expected = (0.95 * 32_767.0_f32).round() as i32;
        assert!((out.peak() - expected).abs() <= 1, "peak {}", out.peak());
        // Sign and relative shape preserved.
        assert!(out.samples[0] > 0 && out.samples[1] < 0);
        assert_eq!(out.samples[3], 0);
        let ratio = out.samples[2] as f32 / out.samples[0] as f32;
        assert!((ratio - 2.5).abs() < 0.01);
    }

    #[test]
    fn normalize_attenuates_full_scale() {
        let buf = AudioBuffer::mono(vec![i16::MIN, i16::MAX], 16_000);
        let out = normalize(&buf);
        assert!(out.peak() <= 31_130);
    }

    // ---- high_pass ---------------------------------------------------------

    #[test]
    fn high_pass_keeps_first_sample() {
        let buf = AudioBuffer::mono(vec![1_000, 1_000, 1_000], 16_000);
        assert_eq!(high_pass(&buf, 80.0).samples[0], 1_000);
    }

    #[test]
    fn high_pass_removes_dc_offset() {
        let buf = AudioBuffer::mono(vec![8_000; 16_000], 16_000);
        let out = high_pass(&buf, 80.0);
        let tail = &out.samples[8_000..];
        assert!(tail.iter().all(|&s| s.abs() < 10), "DC not removed");
    }

    #[test]
    fn high_pass_passes_voice_band() {
        let buf = sine(1_000.0, 16_000, 0.5, 0.5);
        let out = high_pass(&buf, 80.0);
        let ratio = out.peak() as f32 / buf.peak() as f32;
        assert!(ratio > 0.9, "1 kHz attenuated to {ratio}");
    }

    // ---- denoise -----------------------------------------------------------

    #[test]
    fn denoise_short_buffer_returns_input() {
        let buf = AudioBuffer::mono(vec![100; DENOISE_WINDOW - 1], 16_000);
        assert_eq!(denoise(&buf), buf);
    }

    #[test]
    fn denoise_preserves_length_and_format() {
        let buf = sine(220.0, 16_000, 0.3, 0.4);
        let out = denoise(&buf);
        assert_eq!(out.len(), buf.len());
        assert_eq!(out.sample_rate, buf.sample_rate);
        assert_eq!(out.channels, buf.channels);
    }

    #[test]
    fn denoise_reduces_noise_in_quiet_section() {
        let rate = 16_000;
        let mut signal = noise(rate as usize / 2, 0.02);
        let tone = sine(300.0, rate, 0.5, 0.5).to_f32();
        let hiss = noise(tone.len(), 0.02);
        signal.extend(tone.iter().zip(&hiss).map(|(a, b)| a + b));
        let buf = AudioBuffer::from_f32(&signal, rate);

        let out = denoise(&buf);
        let quiet_before = crate::audio::rms_level(&buf.samples[1_000..7_000]);
        let quiet_after = crate::audio::rms_level(&out.samples[1_000..7_000]);
        assert!(
            quiet_after < quiet_before * 0.6,
            "noise {quiet_before} -> {quiet_after}"
        );
    }

    #[test]
    fn denoise_is_deterministic() {
        let buf = AudioBuffer::from_f32(&noise(4_000, 0.3), 16_000);
        assert_eq!(denoise(&buf), denoise(&buf));
    }

    // ---- concatenate -------------------------------------------------------

    #[test]
    fn concatenate_preserves_order() {
        let a = AudioBuffer::mono(vec![1, 2], 16_000);
        let b = AudioBuffer::mono(vec![3], 16_000);
        let out = concatenate(&[a, b]).unwrap();
        assert_eq!(out.samples, vec![1, 2, 3]);
    }

    #[test]
    fn concatenate_rate_mismatch_rejected() {
        let a = AudioBuffer::mono(vec![1, 2], 16_000);
        let b = AudioBuffer::mono(vec![3], 22_050);
        let err = concatenate(&[a, b]).unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)), "{err}");
    }

    #[test]
    fn concatenate_channel_mismatch_rejected() {
        let a = AudioBuffer::mono(vec![1, 2], 16_000);
        let b = AudioBuffer {
            samples: vec![3, 4],
            sample_rate: 16_000,
            channels: 2,
        };
        assert!(concatenate(&[a, b]).is_err());
    }

    #[test]
    fn concatenate_empty_list_rejected() {
        assert!(concatenate(&[]).is_err());
    }

    // ---- SignalConditioner -------------------------------------------------

    #[test]
    fn condition_resamples_and_normalizes() {
        let conditioner = SignalConditioner::new(&AudioConfig::default());
        let buf = sine(200.0, 44_100, 0.5, 0.2);
        let out = conditioner.condition(&buf).unwrap();
        assert_eq!(out.sample_rate, 22_050);
        let expected = (0.95 * 32_767.0_f32).round() as i32;
        assert!((out.peak() - expected).abs() <= 1);
    }

    #[test]
    fn condition_rejects_empty_buffer() {
        let conditioner = SignalConditioner::new(&AudioConfig::default());
        let err = conditioner
            .condition(&AudioBuffer::mono(Vec::new(), 22_050))
            .unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)));
    }

    #[test]
    fn condition_rejects_stereo_at_target_rate() {
        let conditioner = SignalConditioner::new(&AudioConfig::default());
        let mono = sine(200.0, 22_050, 0.5, 0.2);
        let stereo = AudioBuffer {
            samples: mono.samples.iter().flat_map(|&s| [s, s]).collect(),
            sample_rate: 22_050,
            channels: 2,
        };
        let err = conditioner.condition(&stereo).unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)));
    }
}
