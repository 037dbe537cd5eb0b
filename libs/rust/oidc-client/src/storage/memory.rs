//! In-memory store.

use super::KeyValueStore;
use crate::error::TokenResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory store. Its contents die with the process, which makes it the
/// natural session-scoped store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> TokenResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> TokenResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> TokenResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("token").await.unwrap(), None);

        store.set("token", "abc").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("abc"));

        store.set("token", "def").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("def"));
        assert_eq!(store.len().await, 1);

        store.remove("token").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_missing_key() {
        let store = MemoryStore::new();
        assert!(store.remove("absent").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_value_reads_as_absent() {
        let store = MemoryStore::new();
        store.set("refreshToken", "").await.unwrap();
        assert_eq!(
            super::super::read_non_empty(&store, "refreshToken").await.unwrap(),
            None
        );
    }
}
