//! Per-profile acoustic model training.
//!
//! One extraction pass yields the profile's [`FeatureVector`], its
//! [`VoiceCharacteristics`] and a 40-band log-mel frame per analysis
//! window.  Each frame becomes one training example:
//!
//! ```text
//! input  = features[0..96] ++ embedding(frame_unit(frame))   (128 values)
//! target = standardised log-mel frame                        (40 values)
//! ```
//!
//! The network is fitted by full-batch gradient descent for a fixed number
//! of epochs.  Training is synchronous and CPU bound.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::config::TrainingConfig;
use crate::error::{Result, VoiceError};
use crate::features::{FeatureExtractor, FeatureVector, ACOUSTIC_BANDS, FEATURE_LEN, PADDING};
use crate::model::characteristics::VoiceCharacteristics;
use crate::model::network::{Mlp, NetworkError};
use crate::model::units::{self, EMBEDDING_DIM};

/// Serialised artifact format version.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Fewer analysis frames than this (about 0.1 s) cannot be trained on.
pub const MIN_TRAINING_FRAMES: usize = 8;

/// Per-band standard deviation floor for target standardisation.
const STD_FLOOR: f32 = 1e-3;

// ---------------------------------------------------------------------------
// TrainedModel
// ---------------------------------------------------------------------------

/// Read-only weight artifact for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    pub profile_id: String,
    /// Rate the training audio was conditioned to; synthesis renders at it.
    pub sample_rate: u32,
    pub features: FeatureVector,
    pub network: Mlp,
    pub target_mean: Vec<f32>,
    pub target_std: Vec<f32>,
    pub epochs: usize,
    pub final_loss: f32,
}

impl TrainedModel {
    /// Model input for one unit embedding: the profile's features with the
    /// embedding written into the padding slots.
    pub fn model_input(&self, embedding: &[f32; EMBEDDING_DIM]) -> Vec<f32> {
        compose_input(&self.features, embedding)
    }

    /// Predict a `log10` mel frame for `embedding`.
    pub fn infer(&self, embedding: &[f32; EMBEDDING_DIM]) -> std::result::Result<Vec<f32>, NetworkError> {
        if self.target_mean.len() != self.network.output
            || self.target_std.len() != self.network.output
        {
            return Err(NetworkError::Shape);
        }
        let y = self.network.forward(&self.model_input(embedding))?;
        Ok(y.iter()
            .zip(self.target_mean.iter().zip(&self.target_std))
            .map(|(v, (m, s))| v * s + m)
            .collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VoiceError::Storage(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(bytes)
            .map_err(|e| VoiceError::Storage(format!("corrupt model artifact: {e}")))?;
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(VoiceError::Storage(format!(
                "unsupported model format version {}",
                model.format_version
            )));
        }
        Ok(model)
    }
}

fn compose_input(features: &FeatureVector, embedding: &[f32; EMBEDDING_DIM]) -> Vec<f32> {
    let mut input = Vec::with_capacity(FEATURE_LEN);
    input.extend_from_slice(&features.as_slice()[..PADDING.start]);
    input.extend_from_slice(embedding);
    input
}

// ---------------------------------------------------------------------------
// VoiceModelTrainer
// ---------------------------------------------------------------------------

/// Fits a [`TrainedModel`] to one conditioned voice sample.
#[derive(Debug, Clone)]
pub struct VoiceModelTrainer {
    config: TrainingConfig,
    extractor: FeatureExtractor,
}

impl VoiceModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    /// Extract, fit and summarise.  Nothing is persisted here.
    ///
    /// # Errors
    ///
    /// [`VoiceError::TrainingFailed`] when extraction fails, the sample is
    /// too short, or the loss stops being finite.
    pub fn train(
        &self,
        buffer: &AudioBuffer,
        profile_id: &str,
        language: &str,
    ) -> Result<(TrainedModel, VoiceCharacteristics)> {
        let analysis = self
            .extractor
            .analyze(buffer)
            .map_err(|e| VoiceError::TrainingFailed(format!("feature extraction: {e}")))?;

        let frames = &analysis.acoustic_frames;
        if frames.len() < MIN_TRAINING_FRAMES {
            return Err(VoiceError::TrainingFailed(format!(
                "sample too short: {} analysis frames, need at least {MIN_TRAINING_FRAMES}",
                frames.len()
            )));
        }

        let selected = select_evenly(frames.len(), self.config.max_examples.max(1));
        let quartiles = units::energy_quartiles(frames);
        let (target_mean, target_std) = band_statistics(selected.iter().map(|&i| &frames[i]));

        let mut inputs = Vec::with_capacity(selected.len());
        let mut targets = Vec::with_capacity(selected.len());
        for &i in &selected {
            let unit = units::frame_unit(&frames[i], &quartiles);
            inputs.push(compose_input(&analysis.features, &units::embedding(unit, 1.0)));
            targets.push(
                frames[i]
                    .iter()
                    .zip(target_mean.iter().zip(&target_std))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect::<Vec<f32>>(),
            );
        }

        let mut network = Mlp::new(
            FEATURE_LEN,
            self.config.hidden_units.max(1),
            ACOUSTIC_BANDS,
            self.config.seed,
        );
        let fit_err = |e: NetworkError| VoiceError::TrainingFailed(format!("fit diverged: {e}"));

        for epoch in 0..self.config.epochs {
            let loss = network
                .train_step(&inputs, &targets, self.config.learning_rate)
                .map_err(fit_err)?;
            if epoch % 20 == 0 {
                log::debug!("[{profile_id}] epoch {epoch}: loss {loss:.4}");
            }
        }
        let final_loss = network.loss(&inputs, &targets).map_err(fit_err)?;
        if !final_loss.is_finite() {
            return Err(VoiceError::TrainingFailed("final loss is not finite".into()));
        }

        log::info!(
            "trained model for {profile_id}: {} examples, {} epochs, loss {final_loss:.4}",
            inputs.len(),
            self.config.epochs
        );

        let characteristics = VoiceCharacteristics::from_analysis(profile_id, language, &analysis);
        let model = TrainedModel {
            format_version: MODEL_FORMAT_VERSION,
            profile_id: profile_id.to_string(),
            sample_rate: buffer.sample_rate,
            features: analysis.features,
            network,
            target_mean,
            target_std,
            epochs: self.config.epochs,
            final_loss,
        };
        Ok((model, characteristics))
    }
}

/// `count` indices spread evenly over `0..len` (all of them if fewer).
fn select_evenly(len: usize, count: usize) -> Vec<usize> {
    if len <= count {
        return (0..len).collect();
    }
    (0..count).map(|i| i * len / count).collect()
}

fn band_statistics<'a>(frames: impl Iterator<Item = &'a Vec<f32>> + Clone) -> (Vec<f32>, Vec<f32>) {
    let mut sum = vec![0.0f64; ACOUSTIC_BANDS];
    let mut count = 0usize;
    for f in frames.clone() {
        for (acc, &v) in sum.iter_mut().zip(f) {
            *acc += v as f64;
        }
        count += 1;
    }
    let n = count.max(1) as f64;
    let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();

    let mut var = vec![0.0f64; ACOUSTIC_BANDS];
    for f in frames {
        for ((acc, &v), m) in var.iter_mut().zip(f).zip(&mean) {
            *acc += (v as f64 - m).powi(2);
        }
    }
    let std = var
        .iter()
        .map(|v| ((v / n).sqrt() as f32).max(STD_FLOOR))
        .collect();
    (mean.iter().map(|&m| m as f32).collect(), std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 15,
            max_examples: 64,
            hidden_units: 16,
            ..TrainingConfig::default()
        }
    }

    fn vowel_like(f0: f32, secs: f32) -> AudioBuffer {
        let rate = 22_050;
        let n = (rate as f32 * secs) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / rate as f32;
                let env = 0.5 + 0.5 * (2.0 * PI * 3.0 * t).sin();
                env * (0.3 * (2.0 * PI * f0 * t).sin() + 0.15 * (2.0 * PI * 3.0 * f0 * t).sin())
            })
            .collect();
        AudioBuffer::from_f32(&samples, rate)
    }

    #[test]
    fn trains_and_summarises() {
        let trainer = VoiceModelTrainer::new(quick_config());
        let (model, ch) = trainer.train(&vowel_like(160.0, 0.6), "p1", "en").unwrap();

        assert_eq!(model.profile_id, "p1");
        assert_eq!(model.sample_rate, 22_050);
        assert_eq!(model.target_mean.len(), ACOUSTIC_BANDS);
        assert!(model.final_loss.is_finite());
        assert_eq!(ch.language, "en");
        assert!((ch.fundamental_frequency - 160.0).abs() < 8.0);
        assert!(ch.pitch_range.min <= ch.pitch_range.max);

        let frame = model.infer(&units::embedding(3, 1.0)).unwrap();
        assert_eq!(frame.len(), ACOUSTIC_BANDS);
        assert!(frame.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn training_is_deterministic() {
        let trainer = VoiceModelTrainer::new(quick_config());
        let buf = vowel_like(200.0, 0.4);
        let (a, _) = trainer.train(&buf, "p", "en").unwrap();
        let (b, _) = trainer.train(&buf, "p", "en").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_short_sample_fails() {
        let trainer = VoiceModelTrainer::new(quick_config());
        let err = trainer
            .train(&AudioBuffer::mono(vec![100; 1_000], 22_050), "p", "en")
            .unwrap_err();
        assert!(matches!(err, VoiceError::TrainingFailed(_)), "{err}");
    }

    #[test]
    fn empty_sample_fails_as_training_error() {
        let trainer = VoiceModelTrainer::new(quick_config());
        let err = trainer
            .train(&AudioBuffer::mono(Vec::new(), 22_050), "p", "en")
            .unwrap_err();
        assert!(matches!(err, VoiceError::TrainingFailed(_)));
    }

    #[test]
    fn artifact_round_trips_through_bytes() {
        let trainer = VoiceModelTrainer::new(quick_config());
        let (model, ch) = trainer.train(&vowel_like(150.0, 0.3), "p", "es").unwrap();

        let back = TrainedModel::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(back, model);
        let back = VoiceCharacteristics::from_bytes(&ch.to_bytes().unwrap()).unwrap();
        assert_eq!(back, ch);
    }

    #[test]
    fn select_evenly_spreads_indices() {
        assert_eq!(select_evenly(4, 8), vec![0, 1, 2, 3]);
        assert_eq!(select_evenly(10, 5), vec![0, 2, 4, 6, 8]);
    }
}
