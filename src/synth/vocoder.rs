//! Harmonic vocoder: log-mel frames → time-domain samples.
//!
//! Each frame renders `hop_size` samples as a sum of harmonics of `f0`,
//! each weighted by the mel-band magnitude at its frequency.  Harmonic
//! amplitudes ramp linearly from the previous frame and phases carry over,
//! so consecutive frames join without clicks.

use std::f64::consts::TAU;

use crate::features::{MelBank, ACOUSTIC_BANDS, FRAME_LEN};

/// Upper bound on rendered harmonics.
const MAX_HARMONICS: usize = 48;
/// Harmonics stop short of Nyquist by this factor.
const NYQUIST_MARGIN: f32 = 0.95;

pub struct Vocoder {
    sample_rate: u32,
    hop_size: usize,
    f0: f32,
    band_centers: Vec<f32>,
    phases: Vec<f64>,
    prev_amps: Vec<f32>,
}

impl Vocoder {
    pub fn new(sample_rate: u32, hop_size: usize, f0: f32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let harmonics = if f0 > 0.0 {
            ((nyquist * NYQUIST_MARGIN / f0) as usize).clamp(1, MAX_HARMONICS)
        } else {
            0
        };
        let bank = MelBank::new(ACOUSTIC_BANDS, FRAME_LEN, sample_rate);
        Self {
            sample_rate,
            hop_size,
            f0,
            band_centers: bank.centers_hz().to_vec(),
            phases: vec![0.0; harmonics],
            prev_amps: vec![0.0; harmonics],
        }
    }

    /// Samples produced per frame.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Linear magnitude at `hz` interpolated between band centres.
    fn magnitude_at(&self, log_mel: &[f32], hz: f32) -> f32 {
        let centers = &self.band_centers;
        let mag = |i: usize| 10f32.powf(log_mel[i] / 2.0);
        if centers.is_empty() || log_mel.len() < centers.len() {
            return 0.0;
        }
        if hz <= centers[0] {
            return mag(0);
        }
        let last = centers.len() - 1;
        if hz >= centers[last] {
            return mag(last);
        }
        let upper = centers.partition_point(|&c| c < hz);
        let lower = upper - 1;
        let t = (hz - centers[lower]) / (centers[upper] - centers[lower]);
        mag(lower) * (1.0 - t) + mag(upper) * t
    }

    /// Append one voiced frame shaped by `log_mel` to `out`.
    pub fn render_frame(&mut self, log_mel: &[f32], out: &mut Vec<f32>) {
        let amps: Vec<f32> = (0..self.phases.len())
            .map(|h| self.magnitude_at(log_mel, self.f0 * (h + 1) as f32))
            .collect();
        self.render(&amps, out);
    }

    /// Append one frame of silence, fading out whatever was sounding.
    pub fn render_silence(&mut self, out: &mut Vec<f32>) {
        let amps = vec![0.0; self.phases.len()];
        self.render(&amps, out);
    }

    fn render(&mut self, amps: &[f32], out: &mut Vec<f32>) {
        let rate = self.sample_rate as f64;
        let steps: Vec<f64> = (0..self.phases.len())
            .map(|h| TAU * self.f0 as f64 * (h + 1) as f64 / rate)
            .collect();
        let n = self.hop_size.max(1);
        for i in 0..self.hop_size {
            let t = (i + 1) as f32 / n as f32;
            let mut sample = 0.0f32;
            for h in 0..self.phases.len() {
                let amp = self.prev_amps[h] + (amps[h] - self.prev_amps[h]) * t;
                if amp != 0.0 {
                    sample += amp * self.phases[h].sin() as f32;
                }
                self.phases[h] = (self.phases[h] + steps[h]) % TAU;
            }
            out.push(sample);
        }
        self.prev_amps.copy_from_slice(amps);
    }
}
