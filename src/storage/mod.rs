//! Durable key-value storage for model artifacts and the registry snapshot.
//!
//! The pipeline needs only three operations, expressed by [`ArtifactStore`]:
//! `put`, `get` (absent → `None`) and `delete`.  Keys are `/`-separated
//! relative paths such as `models/<id>.json`.
//!
//! | Store           | Backing                                       |
//! |-----------------|-----------------------------------------------|
//! | [`FileStore`]   | one file per key under a root directory       |
//! | [`MemoryStore`] | in-process map, for tests and dry runs        |

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::VoiceError;

/// Key of the serialised profile registry.
pub const REGISTRY_KEY: &str = "registry.json";

/// Key of a profile's model artifact.
pub fn model_key(profile_id: &str) -> String {
    format!("models/{profile_id}.json")
}

/// Key of a profile's characteristics summary.
pub fn characteristics_key(profile_id: &str) -> String {
    format!("characteristics/{profile_id}.json")
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<StoreError> for VoiceError {
    fn from(e: StoreError) -> Self {
        VoiceError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

/// Byte-oriented key-value store.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// behind an `Arc` by every workflow.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Fetch the value under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`.  Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Reject keys that could escape the store root.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_helpers() {
        assert_eq!(model_key("abc"), "models/abc.json");
        assert_eq!(characteristics_key("abc"), "characteristics/abc.json");
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("models/a.json").is_ok());
        assert!(validate_key(REGISTRY_KEY).is_ok());
        for bad in ["", "/etc/passwd", "../x", "a//b", "a/./b", "a\\b"] {
            assert!(validate_key(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn store_error_maps_to_storage_kind() {
        let err: VoiceError = StoreError::InvalidKey("..".into()).into();
        assert_eq!(err.kind(), crate::error::ErrorKind::Storage);
    }
}
