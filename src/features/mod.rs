//! Feature extraction: conditioned audio → fixed-length [`FeatureVector`].
//!
//! # Layout
//!
//! Every vector has exactly [`FEATURE_LEN`] values, always in this order:
//!
//! | Range      | Field                                         |
//! |------------|-----------------------------------------------|
//! | `0..13`    | MFCC mean (13 coefficients, 26 mel bands) ×0.1 |
//! | `13..26`   | MFCC standard deviation ×0.1                  |
//! | `26..52`   | `log10` mel band means ×0.1                   |
//! | `52`       | spectral centroid / Nyquist                   |
//! | `53`       | spectral rolloff (85 %) / Nyquist             |
//! | `54`       | zero-crossing rate                            |
//! | `55..87`   | pitch contour, 32 points, Hz / 500            |
//! | `87..91`   | formants F1–F4 / Nyquist                      |
//! | `91`       | fundamental frequency / 500                   |
//! | `92`, `93` | pitch min / max, Hz / 500                     |
//! | `94`       | intensity (RMS)                               |
//! | `95`       | duration seconds / 60                         |
//! | `96..128`  | zero padding                                  |
//!
//! Analysis uses [`FRAME_LEN`]-sample Hamming frames every [`HOP_LEN`]
//! samples.  Every step is a plain deterministic computation, so the same
//! buffer always yields a bit-identical vector.

pub mod prosody;
pub mod spectral;

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{Result, VoiceError};

pub use prosody::{PitchTracker, PITCH_MAX_HZ, PITCH_MIN_HZ};
pub use spectral::{MelBank, PowerSpectrum, FRAME_LEN, HOP_LEN};

/// Canonical feature-vector length.
pub const FEATURE_LEN: usize = 128;

pub const MFCC_COUNT: usize = 13;
pub const MFCC_BANDS: usize = 26;
/// Bands in the acoustic-output (log-mel) frames the model predicts.
pub const ACOUSTIC_BANDS: usize = 40;
pub const CONTOUR_POINTS: usize = 32;
pub const FORMANT_COUNT: usize = 4;

pub const MFCC_MEAN: Range<usize> = 0..13;
pub const MFCC_STD: Range<usize> = 13..26;
pub const MEL_MEAN: Range<usize> = 26..52;
pub const CENTROID: usize = 52;
pub const ROLLOFF: usize = 53;
pub const ZCR: usize = 54;
pub const PITCH_CONTOUR: Range<usize> = 55..87;
pub const FORMANTS: Range<usize> = 87..91;
pub const F0: usize = 91;
pub const PITCH_MIN: usize = 92;
pub const PITCH_MAX: usize = 93;
pub const INTENSITY: usize = 94;
pub const DURATION: usize = 95;
/// Zero padding at the end of the vector.
pub const PADDING: Range<usize> = 96..FEATURE_LEN;

/// Scale applied to log-domain values before they enter the vector.
const LOG_SCALE: f32 = 0.1;
const PITCH_SCALE: f32 = 500.0;
const DURATION_SCALE: f32 = 60.0;
const ROLLOFF_FRACTION: f32 = 0.85;

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// Fixed-length numeric summary of an audio buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Pad with zeros or truncate `values` to [`FEATURE_LEN`].
    pub fn from_values(mut values: Vec<f32>) -> Self {
        values.resize(FEATURE_LEN, 0.0);
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn get(&self, range: Range<usize>) -> &[f32] {
        &self.0[range]
    }

    pub fn value(&self, index: usize) -> f32 {
        self.0[index]
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = String;

    fn try_from(values: Vec<f32>) -> std::result::Result<Self, Self::Error> {
        if values.len() != FEATURE_LEN {
            return Err(format!(
                "feature vector has {} values, expected {FEATURE_LEN}",
                values.len()
            ));
        }
        Ok(Self(values))
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

// ---------------------------------------------------------------------------
// VoiceAnalysis
// ---------------------------------------------------------------------------

/// Everything one extraction pass produces: the feature vector plus the
/// unscaled measurements and per-frame acoustic targets training needs.
#[derive(Debug, Clone)]
pub struct VoiceAnalysis {
    pub features: FeatureVector,
    /// `log10` mel energies per analysis frame, [`ACOUSTIC_BANDS`] each.
    pub acoustic_frames: Vec<Vec<f32>>,
    /// Per-frame pitch in Hz, 0 where unvoiced.
    pub pitches: Vec<f32>,
    pub fundamental_frequency: f32,
    /// F1–F4 in Hz, 0 where not found.
    pub formants: Vec<f32>,
    pub spectral_centroid: f32,
    /// Unscaled MFCC means.
    pub mfcc_mean: Vec<f32>,
    pub pitch_min: f32,
    pub pitch_max: f32,
}

// ---------------------------------------------------------------------------
// FeatureExtractor
// ---------------------------------------------------------------------------

/// Stateless extractor; FFT plans are built per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Compute the [`FeatureVector`] of `buffer`.
    ///
    /// # Errors
    ///
    /// [`VoiceError::UnsupportedAudioFormat`] for an empty buffer or a zero
    /// sample rate.
    pub fn extract(&self, buffer: &AudioBuffer) -> Result<FeatureVector> {
        Ok(self.analyze(buffer)?.features)
    }

    /// Full analysis pass over `buffer`.
    pub fn analyze(&self, buffer: &AudioBuffer) -> Result<VoiceAnalysis> {
        if buffer.is_empty() {
            return Err(VoiceError::UnsupportedAudioFormat(
                "cannot extract features from an empty buffer".into(),
            ));
        }
        if buffer.sample_rate == 0 {
            return Err(VoiceError::UnsupportedAudioFormat(
                "buffer has a zero sample rate".into(),
            ));
        }

        let rate = buffer.sample_rate;
        let nyquist = rate as f32 / 2.0;
        let samples = buffer.to_f32();
        let frames = spectral::frame_signal(&samples, FRAME_LEN, HOP_LEN);

        let spectrum = PowerSpectrum::new(FRAME_LEN);
        let mfcc_bank = MelBank::new(MFCC_BANDS, FRAME_LEN, rate);
        let acoustic_bank = MelBank::new(ACOUSTIC_BANDS, FRAME_LEN, rate);
        let tracker = PitchTracker::new(FRAME_LEN, rate);

        let mut mfccs: Vec<Vec<f32>> = Vec::with_capacity(frames.len());
        let mut mel_sum = vec![0.0f64; MFCC_BANDS];
        let mut acoustic_frames = Vec::with_capacity(frames.len());
        let mut pitches = Vec::with_capacity(frames.len());
        let (mut centroid_sum, mut rolloff_sum) = (0.0f64, 0.0f64);
        let mut formant_sum = vec![0.0f64; FORMANT_COUNT];
        let mut formant_hits = vec![0usize; FORMANT_COUNT];

        for frame in &frames {
            let power = spectrum.compute(frame);

            let log_mel = mfcc_bank.log_energies(&power);
            for (acc, &v) in mel_sum.iter_mut().zip(&log_mel) {
                *acc += v as f64;
            }
            mfccs.push(spectral::dct_ii(&log_mel, MFCC_COUNT));
            acoustic_frames.push(acoustic_bank.log_energies(&power));

            centroid_sum += spectral::spectral_centroid(&power, rate) as f64;
            rolloff_sum += spectral::spectral_rolloff(&power, rate, ROLLOFF_FRACTION) as f64;

            let pitch = tracker.pitch(frame);
            pitches.push(pitch.unwrap_or(0.0));
            // Formants only mean something where the vocal folds vibrate.
            if pitch.is_some() {
                for (i, f) in prosody::formants(frame, rate, FORMANT_COUNT)
                    .into_iter()
                    .enumerate()
                {
                    if f > 0.0 {
                        formant_sum[i] += f as f64;
                        formant_hits[i] += 1;
                    }
                }
            }
        }

        let n = frames.len() as f64;
        let mfcc_mean: Vec<f32> = (0..MFCC_COUNT)
            .map(|c| (mfccs.iter().map(|m| m[c] as f64).sum::<f64>() / n) as f32)
            .collect();
        let mfcc_std: Vec<f32> = (0..MFCC_COUNT)
            .map(|c| {
                let mean = mfcc_mean[c] as f64;
                let var = mfccs
                    .iter()
                    .map(|m| (m[c] as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;
                var.sqrt() as f32
            })
            .collect();
        let mel_mean: Vec<f32> = mel_sum.iter().map(|&s| (s / n) as f32).collect();
        let spectral_centroid = (centroid_sum / n) as f32;
        let rolloff = (rolloff_sum / n) as f32;
        let formants: Vec<f32> = formant_sum
            .iter()
            .zip(&formant_hits)
            .map(|(&s, &h)| if h == 0 { 0.0 } else { (s / h as f64) as f32 })
            .collect();

        let f0 = prosody::fundamental_frequency(&pitches);
        let (pitch_min, pitch_max) = prosody::pitch_range(&pitches);
        let contour = prosody::pitch_contour(&pitches, CONTOUR_POINTS);

        let mut values = Vec::with_capacity(FEATURE_LEN);
        values.extend(mfcc_mean.iter().map(|v| v * LOG_SCALE));
        values.extend(mfcc_std.iter().map(|v| v * LOG_SCALE));
        values.extend(mel_mean.iter().map(|v| v * LOG_SCALE));
        values.push(spectral_centroid / nyquist);
        values.push(rolloff / nyquist);
        values.push(spectral::zero_crossing_rate(&samples));
        values.extend(contour.iter().map(|p| p / PITCH_SCALE));
        values.extend(formants.iter().map(|f| f / nyquist));
        values.push(f0 / PITCH_SCALE);
        values.push(pitch_min / PITCH_SCALE);
        values.push(pitch_max / PITCH_SCALE);
        values.push(prosody::rms(&samples));
        values.push(buffer.duration_secs() / DURATION_SCALE);
        debug_assert_eq!(values.len(), PADDING.start);

        log::debug!(
            "extracted features from {} frames: f0 {:.1} Hz, centroid {:.0} Hz",
            frames.len(),
            f0,
            spectral_centroid
        );

        Ok(VoiceAnalysis {
            features: FeatureVector::from_values(values),
            acoustic_frames,
            pitches,
            fundamental_frequency: f0,
            formants,
            spectral_centroid,
            mfcc_mean,
            pitch_min,
            pitch_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn voiced(f0: f32, secs: f32) -> AudioBuffer {
        let rate = 22_050;
        let n = (rate as f32 * secs) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / rate as f32;
                0.4 * (2.0 * PI * f0 * t).sin() + 0.2 * (2.0 * PI * 2.0 * f0 * t).sin()
            })
            .collect();
        AudioBuffer::from_f32(&samples, rate)
    }

    #[test]
    fn layout_ranges_are_contiguous() {
        let ranges = [
            MFCC_MEAN,
            MFCC_STD,
            MEL_MEAN,
            CENTROID..CENTROID + 1,
            ROLLOFF..ROLLOFF + 1,
            ZCR..ZCR + 1,
            PITCH_CONTOUR,
            FORMANTS,
            F0..F0 + 1,
            PITCH_MIN..PITCH_MIN + 1,
            PITCH_MAX..PITCH_MAX + 1,
            INTENSITY..INTENSITY + 1,
            DURATION..DURATION + 1,
            PADDING,
        ];
        let mut next = 0;
        for r in ranges {
            assert_eq!(r.start, next);
            next = r.end;
        }
        assert_eq!(next, FEATURE_LEN);
    }

    #[test]
    fn vector_has_canonical_length_for_any_input() {
        let extractor = FeatureExtractor::new();
        for buf in [
            AudioBuffer::mono(vec![1_000], 22_050),
            AudioBuffer::mono(vec![0; 500], 16_000),
            voiced(150.0, 0.5),
        ] {
            assert_eq!(extractor.extract(&buf).unwrap().as_slice().len(), FEATURE_LEN);
        }
    }

    #[test]
    fn extraction_is_bit_identical() {
        let buf = voiced(180.0, 0.8);
        let extractor = FeatureExtractor::new();
        let a = extractor.extract(&buf).unwrap();
        let b = extractor.extract(&buf).unwrap();
        let bits = |v: &FeatureVector| v.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn prosodic_fields_reflect_the_signal() {
        let analysis = FeatureExtractor::new().analyze(&voiced(200.0, 1.0)).unwrap();
        let v = &analysis.features;

        assert!((analysis.fundamental_frequency - 200.0).abs() < 5.0);
        assert!((v.value(F0) - 0.4).abs() < 0.01);
        assert!((v.value(DURATION) - 1.0 / 60.0).abs() < 1e-4);
        assert!(v.value(INTENSITY) > 0.2);
        assert!(v.get(PADDING).iter().all(|&x| x == 0.0));
        assert_eq!(analysis.acoustic_frames[0].len(), ACOUSTIC_BANDS);
        assert!(analysis.pitch_min <= analysis.pitch_max);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let err = FeatureExtractor::new()
            .extract(&AudioBuffer::mono(Vec::new(), 22_050))
            .unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedAudioFormat(_)));
    }

    #[test]
    fn wrong_length_does_not_deserialize() {
        let err = serde_json::from_str::<FeatureVector>("[1.0, 2.0]");
        assert!(err.is_err());
        let ok = serde_json::to_string(&FeatureVector::from_values(vec![1.0])).unwrap();
        assert!(serde_json::from_str::<FeatureVector>(&ok).is_ok());
    }
}
