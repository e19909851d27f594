//! Speaking-style tags and the embedding multiplier each one applies.
//!
//! ```rust
//! use voice_clone::synth::Emotion;
//!
//! assert_eq!(Emotion::from_tag("angry").scalar(), 1.5);
//! assert_eq!(Emotion::from_tag("bewildered"), Emotion::Neutral);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of speaking styles.  Unknown tags are treated as neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Calm,
}

impl Emotion {
    /// Multiplier applied to the phoneme embedding.
    pub fn scalar(self) -> f32 {
        match self {
            Emotion::Neutral => 1.0,
            Emotion::Happy => 1.2,
            Emotion::Sad => 0.8,
            Emotion::Angry => 1.5,
            Emotion::Calm => 0.9,
        }
    }

    /// Parse a request tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "neutral" | "" => Emotion::Neutral,
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "angry" => Emotion::Angry,
            "calm" => Emotion::Calm,
            other => {
                log::debug!("unknown emotion tag {other:?}, using neutral");
                Emotion::Neutral
            }
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Calm => "calm",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        let table = [
            (Emotion::Neutral, 1.0),
            (Emotion::Happy, 1.2),
            (Emotion::Sad, 0.8),
            (Emotion::Angry, 1.5),
            (Emotion::Calm, 0.9),
        ];
        for (e, s) in table {
            assert_eq!(e.scalar(), s);
            assert_eq!(Emotion::from_tag(&e.to_string()), e);
        }
    }

    #[test]
    fn unknown_tag_is_neutral() {
        assert_eq!(Emotion::from_tag("sarcastic"), Emotion::Neutral);
        assert_eq!(Emotion::from_tag("  HAPPY "), Emotion::Happy);
    }
}
