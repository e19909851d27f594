//! Speech synthesis: text chunk → phonemes → acoustic frames → waveform.
//!
//! ```text
//! TextChunk → to_phonemes(language) → phoneme_unit → embedding × (speed·pitch·emotion)
//!           → TrainedModel::infer → log-mel frame × frames_per_phoneme → Vocoder
//! ```

pub mod emotion;
pub mod synthesizer;
pub mod vocoder;

pub use emotion::Emotion;
pub use synthesizer::{
    ChunkSynthesizer, LoadedVoice, Prosody, SpeechSynthesizer, FALLBACK_F0_HZ, PROSODY_RANGE,
};
pub use vocoder::Vocoder;
