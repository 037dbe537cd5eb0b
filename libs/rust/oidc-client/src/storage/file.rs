//! JSON file store.

use super::KeyValueStore;
use crate::error::{TokenError, TokenResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Store persisted as a single JSON object on disk.
///
/// The file is read on first access and rewritten through a temporary file
/// and a rename on every mutation, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl JsonFileStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> TokenResult<HashMap<String, String>> {
        match tokio::fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TokenError::storage(format!("Corrupt store {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(TokenError::storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> TokenResult<()> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| TokenError::storage(format!("Serialization failed: {e}")))?;
        let tmp = self.path.with_extension("tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| TokenError::storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TokenError::storage(format!("Failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), entries = entries.len(), "Store persisted");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> TokenResult<Option<String>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> TokenResult<()> {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.take() {
            Some(entries) => entries,
            None => Self::load(&self.path).await?,
        };
        entries.insert(key.to_string(), value.to_string());
        let result = self.persist(&entries).await;
        *guard = Some(entries);
        result
    }

    async fn remove(&self, key: &str) -> TokenResult<()> {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.take() {
            Some(entries) => entries,
            None => Self::load(&self.path).await?,
        };
        let result = if entries.remove(key).is_some() {
            self.persist(&entries).await
        } else {
            Ok(())
        };
        *guard = Some(entries);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = JsonFileStore::new(&path);
        store.set("refreshToken", "rt-1").await.unwrap();
        drop(store);

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("refreshToken").await.unwrap().as_deref(),
            Some("rt-1")
        );
    }

    #[tokio::test]
    async fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = JsonFileStore::new(&path);
        store.set("refreshToken", "rt-1").await.unwrap();
        store.remove("refreshToken").await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("refreshToken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("refreshToken").await.unwrap(), None);
        assert!(store.remove("refreshToken").await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get("refreshToken").await,
            Err(TokenError::Storage(_))
        ));
    }
}
