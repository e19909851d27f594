//! Mono 16-bit PCM buffer and the format descriptor shared by capture,
//! conditioning and synthesis.
//!
//! # Example
//!
//! ```rust
//! use voice_clone::audio::AudioBuffer;
//!
//! let buf = AudioBuffer::mono(vec![0, 16_384, -16_384], 22_050);
//! assert_eq!(buf.len(), 3);
//! assert!((buf.to_f32()[1] - 0.5).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};

/// Full-scale magnitude used for `i16` ↔ `f32` conversion.
pub const FULL_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Sample rate, channel count and bit depth requested from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// 16-bit mono at `sample_rate`.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// Ordered signed 16-bit samples at a fixed sample rate.
///
/// The sample rate and channel count never change for the lifetime of a
/// buffer; conditioning steps that alter them return a new buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Single-channel buffer.
    pub fn mono(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Build a mono buffer from `f32` samples in `[-1.0, 1.0]`, clamping
    /// anything outside that range.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let samples = samples.iter().map(|&s| f32_to_i16(s)).collect();
        Self::mono(samples, sample_rate)
    }

    /// Samples as `f32` in `[-1.0, 1.0)`.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 / FULL_SCALE).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    /// Largest absolute sample value (`i16::MIN` counts as 32 768).
    pub fn peak(&self) -> i32 {
        self.samples
            .iter()
            .map(|&s| (s as i32).abs())
            .max()
            .unwrap_or(0)
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 16,
        }
    }
}

/// Convert one `f32` sample to `i16`, clamping to the representable range.
pub fn f32_to_i16(s: f32) -> i16 {
    (s * FULL_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Root-mean-square of `samples`, normalised to full scale (`0.0..=1.0`).
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / FULL_SCALE as f64;
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64;
    (mean_sq.sqrt() as f32).min(1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_secs_calculation() {
        let buf = AudioBuffer::mono(vec![0; 11_025], 22_050);
        assert!((buf.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn peak_handles_i16_min() {
        let buf = AudioBuffer::mono(vec![100, i16::MIN, 5], 16_000);
        assert_eq!(buf.peak(), 32_768);
    }

    #[test]
    fn peak_of_empty_is_zero() {
        let buf = AudioBuffer::mono(Vec::new(), 16_000);
        assert_eq!(buf.peak(), 0);
    }

    #[test]
    fn from_f32_clamps() {
        let buf = AudioBuffer::from_f32(&[2.0, -2.0, 0.0], 16_000);
        assert_eq!(buf.samples, vec![i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn rms_of_constant_signal() {
        let level = rms_level(&[16_384; 64]);
        assert!((level - 0.5).abs() < 1e-4, "level = {level}");
    }

    #[test]
    fn rms_of_silence_and_empty() {
        assert_eq!(rms_level(&[0; 32]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }
}
