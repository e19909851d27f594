//! Per-profile voice summary computed once at training time.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};
use crate::features::VoiceAnalysis;

/// Lowest and highest voiced pitch in the sample, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchRange {
    pub min: f32,
    pub max: f32,
}

/// Immutable summary statistics read by every synthesis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCharacteristics {
    pub profile_id: String,
    pub language: String,
    /// Median voiced pitch in Hz; 0 when the sample had no voiced frames.
    pub fundamental_frequency: f32,
    /// F1–F4 in Hz.
    pub formants: Vec<f32>,
    pub spectral_centroid: f32,
    pub mfcc_mean: Vec<f32>,
    pub pitch_range: PitchRange,
}

impl VoiceCharacteristics {
    pub fn from_analysis(profile_id: &str, language: &str, analysis: &VoiceAnalysis) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            language: language.to_string(),
            fundamental_frequency: analysis.fundamental_frequency,
            formants: analysis.formants.clone(),
            spectral_centroid: analysis.spectral_centroid,
            mfcc_mean: analysis.mfcc_mean.clone(),
            pitch_range: PitchRange {
                min: analysis.pitch_min,
                max: analysis.pitch_max,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| VoiceError::Storage(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VoiceError::Storage(format!("corrupt characteristics: {e}")))
    }
}
