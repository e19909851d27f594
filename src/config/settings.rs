//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::AudioFormat;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for capture and signal conditioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Working sample rate in Hz.  Uploaded audio is resampled to this rate
    /// and the capture device is opened with it.
    pub sample_rate: u32,
    /// Capture channel count (the pipeline is mono).
    pub channels: u16,
    /// Capture bit depth.  Only 16 is supported.
    pub bits_per_sample: u16,
    /// Upper bound on a single recording, in seconds.
    pub max_recording_secs: f32,
    /// High-pass cutoff applied during conditioning.
    pub high_pass_cutoff_hz: f32,
    /// Run spectral-subtraction noise reduction during conditioning.
    pub denoise: bool,
    /// Cadence of live level updates while recording.
    pub level_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            channels: 1,
            bits_per_sample: 16,
            max_recording_secs: 60.0,
            high_pass_cutoff_hz: 80.0,
            denoise: true,
            level_interval_ms: 50,
        }
    }
}

impl AudioConfig {
    /// The capture format described by this config.
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Settings for the per-profile acoustic model fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Full-batch gradient descent epochs.
    pub epochs: usize,
    pub learning_rate: f32,
    /// Width of the single hidden layer.
    pub hidden_units: usize,
    /// Analysis frames beyond this count are evenly subsampled.
    pub max_examples: usize,
    /// Seed for weight initialisation.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 60,
            learning_rate: 0.05,
            hidden_units: 64,
            max_examples: 256,
            seed: 0x5EED_F00D,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Settings for text segmentation and waveform reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Clone requests longer than this (in characters) are rejected.
    pub max_text_chars: usize,
    /// Upper bound on a single text chunk, in characters.
    pub max_chunk_chars: usize,
    /// Samples produced per acoustic frame.
    pub hop_size: usize,
    /// Frames per phoneme at speed 1.0.
    pub frames_per_phoneme: usize,
    /// Maximum chunks synthesized concurrently.
    pub workers: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 5_000,
            max_chunk_chars: 200,
            hop_size: 256,
            frames_per_phoneme: 6,
            workers: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Where trained artifacts and the registry snapshot live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the store directory.  `None` means
    /// [`AppPaths::store_dir`].
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved store directory.
    pub fn resolve_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().store_dir)
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_clone::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub training: TrainingConfig,
    pub synthesis: SynthesisConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
