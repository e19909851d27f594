//! Crate-wide error type.
//!
//! Every public operation returns `Result<T, VoiceError>`.  Callers branch on
//! [`VoiceError::kind`] rather than matching message strings.

use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of a [`VoiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedAudioFormat,
    DeviceUnavailable,
    RecordingInterrupted,
    TextTooLong,
    ProfileNotFound,
    TrainingFailed,
    SynthesisFailed,
    Storage,
}

// ---------------------------------------------------------------------------
// VoiceError
// ---------------------------------------------------------------------------

/// All errors surfaced by the capture, training and synthesis pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VoiceError {
    /// Sample rate / channel count / bit depth mismatch, or an empty buffer
    /// where audio is required.
    #[error("unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    /// No input device, requested format rejected, or the device is already
    /// held by another capture session.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device failed mid-capture; it has already been released.
    #[error("recording interrupted: {0}")]
    RecordingInterrupted(String),

    /// Clone request text exceeds the configured maximum.
    #[error("text too long: {len} characters (maximum {max})")]
    TextTooLong { len: usize, max: usize },

    /// No published profile with this id.
    #[error("voice profile not found: {0}")]
    ProfileNotFound(String),

    /// Extraction, fitting or publishing failed; nothing was registered.
    #[error("training failed: {0}")]
    TrainingFailed(String),

    /// A chunk could not be synthesized; the whole request is aborted.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Artifact store failure outside the publish path.
    #[error("storage error: {0}")]
    Storage(String),
}

impl VoiceError {
    /// The kind of this error, for callers that only need to branch.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::UnsupportedAudioFormat(_) => ErrorKind::UnsupportedAudioFormat,
            VoiceError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            VoiceError::RecordingInterrupted(_) => ErrorKind::RecordingInterrupted,
            VoiceError::TextTooLong { .. } => ErrorKind::TextTooLong,
            VoiceError::ProfileNotFound(_) => ErrorKind::ProfileNotFound,
            VoiceError::TrainingFailed(_) => ErrorKind::TrainingFailed,
            VoiceError::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            VoiceError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, VoiceError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            VoiceError::TextTooLong { len: 11, max: 10 }.kind(),
            ErrorKind::TextTooLong
        );
        assert_eq!(
            VoiceError::ProfileNotFound("x".into()).kind(),
            ErrorKind::ProfileNotFound
        );
        assert_eq!(
            VoiceError::Storage("disk".into()).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn text_too_long_message_is_informative() {
        let msg = VoiceError::TextTooLong { len: 5001, max: 5000 }.to_string();
        assert!(msg.contains("5001"), "message: {msg}");
        assert!(msg.contains("5000"), "message: {msg}");
    }
}
