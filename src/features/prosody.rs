//! Prosodic analysis: pitch tracking, LPC formants and intensity.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::features::spectral::hamming_window;

/// Lowest pitch considered, in Hz.
pub const PITCH_MIN_HZ: f32 = 60.0;
/// Highest pitch considered, in Hz.
pub const PITCH_MAX_HZ: f32 = 500.0;

/// Normalised autocorrelation a frame needs to count as voiced.
const VOICING_THRESHOLD: f32 = 0.45;
/// Frames quieter than this RMS are never voiced.
const SILENCE_RMS: f32 = 0.01;
/// Peaks within this fraction of the best one are preferred when earlier,
/// which avoids picking a sub-octave.
const PEAK_TOLERANCE: f32 = 0.9;

/// LPC order used for formant estimation.
pub const LPC_ORDER: usize = 12;
/// Frequency points on which the LPC envelope is evaluated.
const ENVELOPE_POINTS: usize = 512;
/// Formants below this are treated as the spectral tilt, not a resonance.
const FORMANT_FLOOR_HZ: f32 = 90.0;
const PRE_EMPHASIS: f32 = 0.97;

// ---------------------------------------------------------------------------
// Pitch
// ---------------------------------------------------------------------------

/// Autocorrelation pitch tracker for fixed-size frames.
///
/// Autocorrelation is computed through a zero-padded FFT and corrected for
/// the shrinking overlap at longer lags.
pub struct PitchTracker {
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
    size: usize,
    sample_rate: u32,
}

impl PitchTracker {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        let size = (frame_len * 2).next_power_of_two();
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fwd: planner.plan_fft_forward(size),
            inv: planner.plan_fft_inverse(size),
            size,
            sample_rate,
        }
    }

    /// Pitch of `frame` in Hz, or `None` when the frame is unvoiced.
    pub fn pitch(&self, frame: &[f32]) -> Option<f32> {
        let n = frame.len();
        if n == 0 || rms(frame) < SILENCE_RMS {
            return None;
        }
        let mean = frame.iter().sum::<f32>() / n as f32;

        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .map(|&s| Complex::new(s - mean, 0.0))
            .collect();
        buf.resize(self.size, Complex::new(0.0, 0.0));
        self.fwd.process(&mut buf);
        for c in buf.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.inv.process(&mut buf);

        let r0 = buf[0].re;
        if r0 <= 0.0 {
            return None;
        }
        let rate = self.sample_rate as f32;
        let min_lag = (rate / PITCH_MAX_HZ).floor().max(1.0) as usize;
        let max_lag = ((rate / PITCH_MIN_HZ).ceil() as usize).min(n - 1);
        if min_lag + 1 >= max_lag {
            return None;
        }
        let corr: Vec<f32> = (0..=max_lag + 1)
            .map(|lag| {
                if lag >= n {
                    0.0
                } else {
                    buf[lag].re / r0 * n as f32 / (n - lag) as f32
                }
            })
            .collect();

        let best = corr[min_lag..=max_lag]
            .iter()
            .copied()
            .fold(f32::MIN, f32::max);
        if best < VOICING_THRESHOLD {
            return None;
        }
        let lag = (min_lag..=max_lag).find(|&l| {
            corr[l] >= best * PEAK_TOLERANCE && corr[l] >= corr[l - 1] && corr[l] >= corr[l + 1]
        })?;

        // Parabolic refinement around the chosen lag.
        let (a, b, c) = (corr[lag - 1], corr[lag], corr[lag + 1]);
        let denom = a - 2.0 * b + c;
        let offset = if denom.abs() > f32::EPSILON {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        Some(rate / (lag as f32 + offset))
    }
}

/// Sample `pitches` (0 = unvoiced) at `points` evenly spaced positions.
pub fn pitch_contour(pitches: &[f32], points: usize) -> Vec<f32> {
    if pitches.is_empty() {
        return vec![0.0; points];
    }
    (0..points)
        .map(|i| {
            let idx = if points <= 1 {
                0
            } else {
                i * (pitches.len() - 1) / (points - 1)
            };
            pitches[idx]
        })
        .collect()
}

/// Median of the voiced entries; 0 when nothing is voiced.
pub fn fundamental_frequency(pitches: &[f32]) -> f32 {
    let mut voiced: Vec<f32> = pitches.iter().copied().filter(|&p| p > 0.0).collect();
    if voiced.is_empty() {
        return 0.0;
    }
    voiced.sort_by(f32::total_cmp);
    let mid = voiced.len() / 2;
    if voiced.len() % 2 == 0 {
        (voiced[mid - 1] + voiced[mid]) / 2.0
    } else {
        voiced[mid]
    }
}

/// `(min, max)` of the voiced entries; `(0, 0)` when nothing is voiced.
pub fn pitch_range(pitches: &[f32]) -> (f32, f32) {
    pitches
        .iter()
        .copied()
        .filter(|&p| p > 0.0)
        .fold(None, |acc: Option<(f32, f32)>, p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
        })
        .unwrap_or((0.0, 0.0))
}

// ---------------------------------------------------------------------------
// Formants
// ---------------------------------------------------------------------------

/// Linear-prediction coefficients `a[1..=order]` via Levinson–Durbin,
/// so that `x[n] ≈ Σ a[k]·x[n-k]`.  `None` for a degenerate frame.
pub fn lpc(frame: &[f32], order: usize) -> Option<Vec<f64>> {
    if frame.len() <= order {
        return None;
    }
    let r: Vec<f64> = (0..=order)
        .map(|lag| {
            frame[lag..]
                .iter()
                .zip(frame)
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect();
    if r[0] <= 0.0 {
        return None;
    }

    let mut a = vec![0.0f64; order + 1];
    let mut err = r[0];
    for i in 1..=order {
        let acc: f64 = (1..i).map(|j| a[j] * r[i - j]).sum();
        let k = (r[i] - acc) / err;
        if !k.is_finite() {
            return None;
        }
        let prev = a.clone();
        a[i] = k;
        for j in 1..i {
            a[j] = prev[j] - k * prev[i - j];
        }
        err *= 1.0 - k * k;
        if err <= 0.0 {
            break;
        }
    }
    Some(a[1..].to_vec())
}

/// First `count` formant frequencies of `frame` in Hz, ascending.
///
/// Peaks of the LPC envelope `1/|A(e^jω)|`; missing formants are 0.
pub fn formants(frame: &[f32], sample_rate: u32, count: usize) -> Vec<f32> {
    let mut out = vec![0.0; count];
    let window = hamming_window(frame.len());
    let mut emphasized: Vec<f32> = Vec::with_capacity(frame.len());
    let mut prev = 0.0;
    for (&s, &w) in frame.iter().zip(&window) {
        emphasized.push((s - PRE_EMPHASIS * prev) * w);
        prev = s;
    }
    let Some(coeffs) = lpc(&emphasized, LPC_ORDER) else {
        return out;
    };

    let nyquist = sample_rate as f32 / 2.0;
    let envelope: Vec<f64> = (0..ENVELOPE_POINTS)
        .map(|i| {
            let w = std::f64::consts::PI * i as f64 / (ENVELOPE_POINTS - 1) as f64;
            let (mut re, mut im) = (1.0f64, 0.0f64);
            for (k, &a) in coeffs.iter().enumerate() {
                let phase = w * (k + 1) as f64;
                re -= a * phase.cos();
                im += a * phase.sin();
            }
            1.0 / (re * re + im * im).max(1e-12)
        })
        .collect();

    let mut found = 0;
    for i in 1..ENVELOPE_POINTS - 1 {
        if found == count {
            break;
        }
        if envelope[i] > envelope[i - 1] && envelope[i] >= envelope[i + 1] {
            let hz = nyquist * i as f32 / (ENVELOPE_POINTS - 1) as f32;
            if hz >= FORMANT_FLOOR_HZ {
                out[found] = hz;
                found += 1;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Intensity
// ---------------------------------------------------------------------------

/// Root-mean-square amplitude of `samples`.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const RATE: u32 = 22_050;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    /// Pulse train at `f0` through a two-pole resonator at `resonance`.
    fn resonant_pulses(f0: f32, resonance: f32, n: usize) -> Vec<f32> {
        let r = 0.97f32;
        let theta = 2.0 * PI * resonance / RATE as f32;
        let (a1, a2) = (2.0 * r * theta.cos(), -r * r);
        let period = (RATE as f32 / f0) as usize;
        let mut y = vec![0.0f32; n];
        for i in 0..n {
            let x = if i % period == 0 { 1.0 } else { 0.0 };
            let y1 = if i >= 1 { y[i - 1] } else { 0.0 };
            let y2 = if i >= 2 { y[i - 2] } else { 0.0 };
            y[i] = x + a1 * y1 + a2 * y2;
        }
        let peak = y.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        y.iter().map(|v| 0.5 * v / peak).collect()
    }

    #[test]
    fn pitch_of_pure_tone() {
        let tracker = PitchTracker::new(1024, RATE);
        for freq in [110.0, 200.0, 330.0] {
            let p = tracker.pitch(&sine(freq, 1024)).expect("voiced");
            assert!((p - freq).abs() < freq * 0.02, "{freq} Hz tracked as {p}");
        }
    }

    #[test]
    fn silence_is_unvoiced() {
        let tracker = PitchTracker::new(1024, RATE);
        assert!(tracker.pitch(&[0.0; 1024]).is_none());
    }

    #[test]
    fn contour_and_statistics() {
        let pitches = [0.0, 100.0, 200.0, 0.0, 150.0];
        assert_eq!(pitch_contour(&pitches, 3), vec![0.0, 200.0, 150.0]);
        assert_eq!(fundamental_frequency(&pitches), 150.0);
        assert_eq!(pitch_range(&pitches), (100.0, 200.0));
        assert_eq!(fundamental_frequency(&[0.0, 0.0]), 0.0);
        assert_eq!(pitch_range(&[]), (0.0, 0.0));
        assert_eq!(pitch_contour(&[], 4), vec![0.0; 4]);
    }

    #[test]
    fn lpc_recovers_ar2_coefficients() {
        let signal = resonant_pulses(100.0, 1_000.0, 4_096);
        let a = lpc(&signal, 2).expect("lpc");
        let theta = 2.0 * std::f64::consts::PI * 1_000.0 / RATE as f64;
        assert!((a[0] - 2.0 * 0.97 * theta.cos()).abs() < 0.1, "{a:?}");
        assert!((a[1] + 0.97 * 0.97).abs() < 0.1, "{a:?}");
    }

    #[test]
    fn first_formant_near_resonance() {
        let frame = resonant_pulses(120.0, 700.0, 1024);
        let f = formants(&frame, RATE, 4);
        assert_eq!(f.len(), 4);
        assert!((f[0] - 700.0).abs() < 150.0, "formants {f:?}");
        let nonzero: Vec<f32> = f.iter().copied().filter(|&x| x > 0.0).collect();
        assert!(nonzero.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn formants_of_silence_are_zero() {
        assert_eq!(formants(&[0.0; 1024], RATE, 4), vec![0.0; 4]);
    }

    #[test]
    fn rms_of_constant() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
