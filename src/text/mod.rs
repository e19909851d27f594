//! Text side of synthesis: chunking, phonemes and language metadata.

pub mod language;
pub mod phonemes;
pub mod segmenter;

pub use language::LanguageInfo;
pub use phonemes::{to_phonemes, Phoneme};
pub use segmenter::{segment, TextChunk, SENTENCE_TERMINATORS};
