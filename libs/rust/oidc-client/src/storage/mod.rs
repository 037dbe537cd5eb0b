//! Key-value stores holding the two tokens.
//!
//! The access token lives in a session-scoped store and the refresh token in
//! a persistent one. Both sit behind the same [`KeyValueStore`] contract so
//! the embedding application decides where they actually go.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::TokenResult;
use async_trait::async_trait;

/// Session-store key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "token";

/// Persistent-store key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// String key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> TokenResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> TokenResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> TokenResult<()>;
}

/// Read a value, treating the empty string as absent.
pub(crate) async fn read_non_empty(
    store: &dyn KeyValueStore,
    key: &str,
) -> TokenResult<Option<String>> {
    Ok(store.get(key).await?.filter(|value| !value.is_empty()))
}
