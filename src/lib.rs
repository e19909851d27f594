//! Voice cloning: train a per-speaker acoustic model from a short voice
//! sample, then synthesize arbitrary text in that voice.
//!
//! | Module       | Responsibility                                         |
//! |--------------|--------------------------------------------------------|
//! | [`audio`]    | buffers, capture devices, conditioning, WAV I/O        |
//! | [`features`] | spectral and prosodic feature extraction               |
//! | [`model`]    | per-profile network, trainer, voice characteristics    |
//! | [`text`]     | chunking, language detection, phoneme conversion       |
//! | [`synth`]    | chunk synthesis and the harmonic vocoder               |
//! | [`storage`]  | artifact stores                                        |
//! | [`pipeline`] | the orchestrator tying it all together                 |

pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod synth;
pub mod text;

pub use error::{ErrorKind, Result, VoiceError};
