//! Frame-level spectral analysis: STFT power spectrum, mel filterbank,
//! MFCC, spectral centroid, rolloff and zero-crossing rate.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Analysis frame length in samples.
pub const FRAME_LEN: usize = 1024;

/// Hop between consecutive analysis frames.
pub const HOP_LEN: usize = 256;

/// Floor applied before taking the logarithm of a mel energy.
const LOG_FLOOR: f32 = 1e-10;

/// Generates a symmetric Hamming window of the given length.
pub fn hamming_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / (n - 1) as f32).cos())
        .collect()
}

/// Split `samples` into `frame_len` frames spaced `hop` apart.
///
/// The last frame is zero padded; a signal shorter than one frame yields a
/// single padded frame, and an empty signal yields none.
pub fn frame_signal(samples: &[f32], frame_len: usize, hop: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() || frame_len == 0 || hop == 0 {
        return Vec::new();
    }
    let count = if samples.len() <= frame_len {
        1
    } else {
        1 + (samples.len() - frame_len).div_ceil(hop)
    };
    (0..count)
        .map(|i| {
            let start = i * hop;
            let end = (start + frame_len).min(samples.len());
            let mut frame = samples[start..end].to_vec();
            frame.resize(frame_len, 0.0);
            frame
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Power spectrum
// ---------------------------------------------------------------------------

/// Windowed FFT producing one-sided power spectra of `FRAME_LEN` frames.
pub struct PowerSpectrum {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl PowerSpectrum {
    pub fn new(frame_len: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(frame_len),
            window: hamming_window(frame_len),
        }
    }

    /// Number of bins returned by [`compute`](Self::compute).
    pub fn bins(&self) -> usize {
        self.window.len() / 2 + 1
    }

    /// `|X[k]|²` for `k` in `0..=N/2`.
    pub fn compute(&self, frame: &[f32]) -> Vec<f32> {
        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        buf.resize(self.window.len(), Complex::new(0.0, 0.0));
        self.fft.process(&mut buf);
        buf[..self.bins()].iter().map(|c| c.norm_sqr()).collect()
    }
}

// ---------------------------------------------------------------------------
// Mel filterbank
// ---------------------------------------------------------------------------

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters over a one-sided power spectrum.
#[derive(Debug, Clone)]
pub struct MelBank {
    filters: Vec<Vec<f32>>,
    centers_hz: Vec<f32>,
}

impl MelBank {
    /// `num_mels` filters spanning `0..sample_rate/2`.
    pub fn new(num_mels: usize, fft_size: usize, sample_rate: u32) -> Self {
        let half_fft = fft_size / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let high_mel = hz_to_mel(nyquist);
        let step = high_mel / (num_mels + 1) as f32;
        let edges_hz: Vec<f32> = (0..num_mels + 2)
            .map(|i| mel_to_hz(i as f32 * step))
            .collect();

        let mut bins: Vec<usize> = edges_hz
            .iter()
            .map(|&hz| {
                let bin = (hz * fft_size as f32 / sample_rate as f32).round() as usize;
                bin.min(half_fft - 1)
            })
            .collect();
        // Every filter spans at least one bin.
        for i in 1..bins.len() {
            if bins[i] <= bins[i - 1] {
                bins[i] = bins[i - 1] + 1;
            }
        }

        let filters = (0..num_mels)
            .map(|m| {
                let (left, center, right) = (bins[m], bins[m + 1], bins[m + 2]);
                let mut filter = vec![0.0f32; half_fft];
                for (k, w) in filter.iter_mut().enumerate().take(center.min(half_fft)).skip(left) {
                    *w = (k - left) as f32 / (center - left) as f32;
                }
                for (k, w) in filter
                    .iter_mut()
                    .enumerate()
                    .take(right.min(half_fft - 1) + 1)
                    .skip(center)
                {
                    *w = (right - k) as f32 / (right - center) as f32;
                }
                filter
            })
            .collect();

        Self {
            filters,
            centers_hz: edges_hz[1..=num_mels].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Centre frequency of each filter in Hz.
    pub fn centers_hz(&self) -> &[f32] {
        &self.centers_hz
    }

    /// `log10` mel energies of one power spectrum.
    pub fn log_energies(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                let e: f32 = filter.iter().zip(power).map(|(w, p)| w * p).sum();
                e.max(LOG_FLOOR).log10()
            })
            .collect()
    }
}

/// Orthonormal DCT-II of `input`, keeping the first `n_coeffs` terms.
pub fn dct_ii(input: &[f32], n_coeffs: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_coeffs];
    }
    let n_f = n as f32;
    (0..n_coeffs)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n_f).sqrt()
            } else {
                (2.0 / n_f).sqrt()
            };
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x * (PI * k as f32 * (i as f32 + 0.5) / n_f).cos())
                .sum();
            scale * sum
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scalar descriptors
// ---------------------------------------------------------------------------

fn bin_hz(k: usize, bins: usize, sample_rate: u32) -> f32 {
    k as f32 * (sample_rate as f32 / 2.0) / (bins - 1).max(1) as f32
}

/// Power-weighted mean frequency in Hz; 0 for a silent frame.
pub fn spectral_centroid(power: &[f32], sample_rate: u32) -> f32 {
    let total: f32 = power.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = power
        .iter()
        .enumerate()
        .map(|(k, &p)| bin_hz(k, power.len(), sample_rate) * p)
        .sum();
    weighted / total
}

/// Frequency below which `fraction` of the frame's power lies.
pub fn spectral_rolloff(power: &[f32], sample_rate: u32, fraction: f32) -> f32 {
    let total: f32 = power.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = total * fraction;
    let mut acc = 0.0;
    for (k, &p) in power.iter().enumerate() {
        acc += p;
        if acc >= threshold {
            return bin_hz(k, power.len(), sample_rate);
        }
    }
    sample_rate as f32 / 2.0
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
