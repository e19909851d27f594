//! Text chunk → phonemes → model inference → waveform.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::config::SynthesisConfig;
use crate::error::{Result, VoiceError};
use crate::model::units;
use crate::model::{TrainedModel, VoiceCharacteristics};
use crate::synth::emotion::Emotion;
use crate::synth::vocoder::Vocoder;
use crate::text::{to_phonemes, Phoneme, TextChunk};

/// Pitch used when the profile had no voiced frames.
pub const FALLBACK_F0_HZ: f32 = 120.0;
/// Output chunks are scaled to this peak (fraction of full scale).
const OUTPUT_PEAK: f32 = 0.9;
const MIN_F0_HZ: f32 = 40.0;
/// Accepted range for the speed and pitch multipliers.
pub const PROSODY_RANGE: std::ops::RangeInclusive<f32> = 0.25..=4.0;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Model and characteristics resolved once per clone request.
#[derive(Debug, Clone)]
pub struct LoadedVoice {
    pub model: Arc<TrainedModel>,
    pub characteristics: Arc<VoiceCharacteristics>,
}

/// Per-request modulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    pub speed: f32,
    pub pitch: f32,
    pub emotion: Emotion,
}

impl Default for Prosody {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            emotion: Emotion::Neutral,
        }
    }
}

impl Prosody {
    /// Combined multiplier applied to every phoneme embedding.
    pub fn embedding_scale(&self) -> f32 {
        self.speed * self.pitch * self.emotion.scalar()
    }

    /// Speed and pitch must lie within [`PROSODY_RANGE`].
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("speed", self.speed), ("pitch", self.pitch)] {
            if !PROSODY_RANGE.contains(&v) {
                return Err(VoiceError::SynthesisFailed(format!(
                    "{name} must be between {} and {}, got {v}",
                    PROSODY_RANGE.start(),
                    PROSODY_RANGE.end()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChunkSynthesizer
// ---------------------------------------------------------------------------

/// Renders one text chunk.  Implementations must be safe to call from
/// several worker threads at once.
pub trait ChunkSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        chunk: &TextChunk,
        voice: &LoadedVoice,
        language: &str,
        prosody: &Prosody,
    ) -> Result<AudioBuffer>;
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer
// ---------------------------------------------------------------------------

/// Model-driven synthesizer with a harmonic vocoder back end.
#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    config: SynthesisConfig,
}

impl SpeechSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Frames rendered per phoneme at `speed`.
    pub fn frames_per_phoneme(&self, speed: f32) -> usize {
        ((self.config.frames_per_phoneme as f32 / speed).round() as usize).max(1)
    }
}

impl ChunkSynthesizer for SpeechSynthesizer {
    fn synthesize(
        &self,
        chunk: &TextChunk,
        voice: &LoadedVoice,
        language: &str,
        prosody: &Prosody,
    ) -> Result<AudioBuffer> {
        prosody.validate()?;
        let model = &voice.model;
        if model.sample_rate == 0 || self.config.hop_size == 0 {
            return Err(VoiceError::SynthesisFailed(
                "model has no usable sample rate or hop size".into(),
            ));
        }

        let phonemes = to_phonemes(&chunk.text, language);
        let frames = self.frames_per_phoneme(prosody.speed);
        let scale = prosody.embedding_scale();

        let base_f0 = match voice.characteristics.fundamental_frequency {
            f if f > 0.0 => f,
            _ => FALLBACK_F0_HZ,
        };
        let f0 = (base_f0 * prosody.pitch).clamp(MIN_F0_HZ, model.sample_rate as f32 / 4.0);
        let mut vocoder = Vocoder::new(model.sample_rate, self.config.hop_size, f0);

        let mut cache: HashMap<usize, Vec<f32>> = HashMap::new();
        let capacity = phonemes
            .len()
            .checked_mul(frames)
            .and_then(|n| n.checked_mul(self.config.hop_size))
            .ok_or_else(|| {
                VoiceError::SynthesisFailed(format!("chunk {} is too long to render", chunk.index))
            })?;
        let mut samples = Vec::with_capacity(capacity);

        for phoneme in &phonemes {
            match phoneme {
                Phoneme::Pause => {
                    for _ in 0..frames {
                        vocoder.render_silence(&mut samples);
                    }
                }
                Phoneme::Sound(symbol) => {
                    let unit = units::phoneme_unit(symbol);
                    if !cache.contains_key(&unit) {
                        let frame = model
                            .infer(&units::embedding(unit, scale))
                            .map_err(|e| {
                                VoiceError::SynthesisFailed(format!(
                                    "chunk {}: inference for {symbol:?}: {e}",
                                    chunk.index
                                ))
                            })?;
                        cache.insert(unit, frame);
                    }
                    if let Some(frame) = cache.get(&unit) {
                        for _ in 0..frames {
                            vocoder.render_frame(frame, &mut samples);
                        }
                    }
                }
            }
        }

        if samples.iter().any(|s| !s.is_finite()) {
            return Err(VoiceError::SynthesisFailed(format!(
                "chunk {} produced non-finite samples",
                chunk.index
            )));
        }
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 0.0 {
            let gain = OUTPUT_PEAK / peak;
            for s in samples.iter_mut() {
                *s *= gain;
            }
        }

        log::debug!(
            "chunk {}: {} phonemes, {} samples",
            chunk.index,
            phonemes.len(),
            samples.len()
        );
        Ok(AudioBuffer::from_f32(&samples, model.sample_rate))
    }
}
