//! Audio pipeline: capture → resampling → filtering → noise reduction → normalisation.
//!
//! # Pipeline
//!
//! ```text
//! AudioDevice → CaptureSession (exclusive) → AudioBuffer ─┐
//! WAV file    → read_wav (downmix, 16-bit)  → AudioBuffer ─┤
//!                                                          ▼
//!        SignalConditioner: resample → high_pass → denoise → normalize
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use voice_clone::audio::{read_wav, SignalConditioner};
//! use voice_clone::config::AudioConfig;
//!
//! let take = read_wav(Path::new("sample.wav")).unwrap();
//! let conditioned = SignalConditioner::new(&AudioConfig::default())
//!     .condition(&take)
//!     .unwrap();
//! println!("{:.1}s @ {} Hz", conditioned.duration_secs(), conditioned.sample_rate);
//! ```

pub mod buffer;
pub mod capture;
pub mod conditioner;
pub mod resample;
pub mod wav;

pub use buffer::{f32_to_i16, rms_level, AudioBuffer, AudioFormat, FULL_SCALE};
pub use capture::{
    AudioCapture, AudioDevice, CancelHandle, CaptureLevel, CaptureSession, CpalDevice,
    InputStream, PlaybackDevice,
};
pub use conditioner::{concatenate, denoise, high_pass, normalize, SignalConditioner};
pub use resample::{resample, stereo_to_mono};
pub use wav::{read_wav, write_wav};
