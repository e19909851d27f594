//! In-memory [`ArtifactStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_key, ArtifactStore, StoreError};

/// Map-backed store.  Optionally fails every `put` whose key starts with a
/// given prefix, which lets callers exercise their rollback paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_puts_with_prefix: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `put` fails for keys starting with `prefix`.
    pub fn failing_puts(prefix: impl Into<String>) -> Self {
        Self {
            entries: Mutex::default(),
            fail_puts_with_prefix: Some(prefix.into()),
        }
    }

    /// Sorted snapshot of the stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        if let Some(prefix) = &self.fail_puts_with_prefix {
            if key.starts_with(prefix.as_str()) {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("injected write failure"),
                });
            }
        }
        self.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_operations() {
        let store = MemoryStore::new();
        store.put("a/b", vec![1, 2]).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(vec![1, 2]));
        assert_eq!(store.get("a/c").await.unwrap(), None);
        store.delete("a/b").await.unwrap();
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_only_hit_matching_keys() {
        let store = MemoryStore::failing_puts("characteristics/");
        assert!(store.put("models/x.json", vec![]).await.is_ok());
        assert!(store.put("characteristics/x.json", vec![]).await.is_err());
        assert_eq!(store.keys(), vec!["models/x.json".to_string()]);
    }
}
