//! Directory-backed [`ArtifactStore`].
//!
//! Each key maps to a file under the root.  Writes go to a sibling temp
//! file that is then renamed over the target, so readers never observe a
//! half-written artifact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{validate_key, ArtifactStore, StoreError};

pub struct FileStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Store rooted at `root`; the directory is created lazily on first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, part| p.join(part)))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for FileStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(key))?;
        }
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}-{n}", std::process::id()));

        tokio::fs::write(&tmp, &bytes).await.map_err(io_err(key))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(key)(e));
        }
        log::debug!("stored {key} ({} bytes)", bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        store.put("models/a.json", b"{}".to_vec()).await.unwrap();
        assert!(dir.path().join("models").join("a.json").exists());
        assert_eq!(store.get("models/a.json").await.unwrap(), Some(b"{}".to_vec()));

        store.delete("models/a.json").await.unwrap();
        assert_eq!(store.get("models/a.json").await.unwrap(), None);
        // Deleting again is fine.
        store.delete("models/a.json").await.unwrap();
    }

    #[tokio::test]
    async fn put_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        store.put("registry.json", b"one".to_vec()).await.unwrap();
        store.put("registry.json", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("registry.json").await.unwrap(), Some(b"two".to_vec()));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["registry.json".to_string()]);
    }

    #[tokio::test]
    async fn missing_root_reads_as_absent() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("not-created"));
        assert_eq!(store.get("registry.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.put("../escape", vec![1]).await,
            Err(StoreError::InvalidKey(_))
        ));
    }
}
