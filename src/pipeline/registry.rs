//! In-memory profile registry with per-id write serialisation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Result, VoiceError};

const SNAPSHOT_VERSION: u32 = 1;

/// A named, trained voice identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    pub language: String,
    /// Store key of the trained model artifact.
    pub model_key: String,
    pub created_at: DateTime<Utc>,
    /// Length of the conditioned training audio, in seconds.
    pub source_duration_secs: f32,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistrySnapshot {
    version: u32,
    profiles: Vec<VoiceProfile>,
}

/// id → [`VoiceProfile`], plus one async lock per id so that create and
/// delete on the same id never interleave.
#[derive(Default)]
pub struct ProfileRegistry {
    profiles: RwLock<HashMap<String, VoiceProfile>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `id`.  Other ids are unaffected.
    ///
    /// The per-id lock is dropped from the map once its last holder or
    /// waiter is gone.
    pub async fn lock_id(&self, id: &str) -> IdGuard<'_> {
        let lock = {
            let mut locks = self.lock_map();
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        IdGuard {
            guard: Some(lock.lock_owned().await),
            id: id.to_string(),
            locks: &self.locks,
        }
    }

    pub fn get(&self, id: &str) -> Option<VoiceProfile> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn insert(&self, profile: VoiceProfile) {
        self.write().insert(profile.id.clone(), profile);
    }

    pub fn remove(&self, id: &str) -> Option<VoiceProfile> {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All profiles, oldest first (ties broken by id).
    pub fn list(&self) -> Vec<VoiceProfile> {
        let mut all: Vec<VoiceProfile> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Serialised snapshot of the current contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Self::snapshot_bytes(self.list())
    }

    /// Serialise `profiles` in snapshot format.
    pub fn snapshot_bytes(profiles: Vec<VoiceProfile>) -> Result<Vec<u8>> {
        let snapshot = RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            profiles,
        };
        serde_json::to_vec_pretty(&snapshot).map_err(|e| VoiceError::Storage(e.to_string()))
    }

    /// Parse a snapshot produced by [`to_bytes`](Self::to_bytes).
    pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<VoiceProfile>> {
        let snapshot: RegistrySnapshot = serde_json::from_slice(bytes)
            .map_err(|e| VoiceError::Storage(format!("corrupt registry snapshot: {e}")))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VoiceError::Storage(format!(
                "unsupported registry snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot.profiles)
    }

    pub(crate) fn lock_map(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, VoiceProfile>> {
        self.profiles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, VoiceProfile>> {
        self.profiles.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive access to one profile id, from [`ProfileRegistry::lock_id`].
pub struct IdGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    locks: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        // Release first so the owned guard's reference is not counted.
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn profile(id: &str, secs: i64) -> VoiceProfile {
        VoiceProfile {
            id: id.into(),
            name: format!("voice {id}"),
            language: "en".into(),
            model_key: format!("models/{id}.json"),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            source_duration_secs: 3.0,
            sample_rate: 22_050,
        }
    }

    #[test]
    fn list_is_sorted_by_creation_time() {
        let reg = ProfileRegistry::new();
        reg.insert(profile("b", 20));
        reg.insert(profile("a", 30));
        reg.insert(profile("c", 10));
        let ids: Vec<String> = reg.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn insert_get_remove() {
        let reg = ProfileRegistry::new();
        reg.insert(profile("x", 0));
        assert!(reg.contains("x"));
        assert_eq!(reg.get("x").unwrap().name, "voice x");
        assert!(reg.remove("x").is_some());
        assert!(reg.remove("x").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let reg = ProfileRegistry::new();
        reg.insert(profile("a", 1));
        reg.insert(profile("b", 2));
        let parsed = ProfileRegistry::parse_snapshot(&reg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, reg.list());
        assert!(ProfileRegistry::parse_snapshot(b"not json").is_err());
    }

    #[tokio::test]
    async fn same_id_is_serialised_other_ids_are_not() {
        let reg = Arc::new(ProfileRegistry::new());
        let guard = reg.lock_id("p").await;

        // A different id is immediately available.
        let other = tokio::time::timeout(Duration::from_millis(50), reg.lock_id("q")).await;
        assert!(other.is_ok());

        // The same id waits until the first guard is dropped.
        let reg2 = Arc::clone(&reg);
        let waiter = tokio::spawn(async move {
            let _g = reg2.lock_id("p").await;
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .unwrap();
        drop(other);
        assert!(reg.lock_map().is_empty());
    }

    #[tokio::test]
    async fn released_locks_do_not_accumulate() {
        let reg = ProfileRegistry::new();
        for i in 0..1_000 {
            let _g = reg.lock_id(&format!("id-{i}")).await;
        }
        assert!(reg.lock_map().is_empty());
    }

    #[tokio::test]
    async fn lock_entry_survives_while_someone_waits() {
        let reg = Arc::new(ProfileRegistry::new());
        let first = reg.lock_id("p").await;

        let reg2 = Arc::clone(&reg);
        let waiter = tokio::spawn(async move {
            let _g = reg2.lock_id("p").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        // The waiter still references the entry, so it must not be removed.
        assert_eq!(reg.lock_map().len(), 1);

        waiter.await.unwrap();
        assert!(reg.lock_map().is_empty());
    }
}
