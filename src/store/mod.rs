// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistent key/value storage for session tokens.
//!
//! Every instance of the session manager that shares a store sees the same
//! tokens. Writes are last-write-wins; reads are a snapshot at call time.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::models::CachedUser;

/// Storage key names.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "bluesky-access-token";
    pub const REFRESH_TOKEN: &str = "bluesky-refresh-token";
    pub const USER_DATA: &str = "bluesky-user-data";
    pub const AUTH_EVENT: &str = "bluesky-auth-event";
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal string key/value store.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Remove `key` only if it still holds `expected`, atomically with
    /// respect to other writers. Returns whether it was removed.
    fn remove_if(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

/// The persisted token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Both tokens, or nothing.
pub fn load_tokens(store: &dyn TokenStore) -> Option<StoredTokens> {
    let access_jwt = store.get(keys::ACCESS_TOKEN).filter(|t| !t.is_empty())?;
    let refresh_jwt = store.get(keys::REFRESH_TOKEN).filter(|t| !t.is_empty())?;
    Some(StoredTokens {
        access_jwt,
        refresh_jwt,
    })
}

pub fn save_tokens(
    store: &dyn TokenStore,
    access_jwt: &str,
    refresh_jwt: &str,
) -> Result<(), StoreError> {
    store.set(keys::ACCESS_TOKEN, access_jwt)?;
    store.set(keys::REFRESH_TOKEN, refresh_jwt)
}

/// Cached profile blob. A blob that no longer parses is treated as absent.
pub fn load_cached_user(store: &dyn TokenStore) -> Option<CachedUser> {
    let raw = store.get(keys::USER_DATA)?;
    match serde_json::from_str(&raw) {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unreadable cached user data");
            None
        }
    }
}

pub fn save_cached_user(store: &dyn TokenStore, user: &CachedUser) -> Result<(), StoreError> {
    store.set(keys::USER_DATA, &serde_json::to_string(user)?)
}

/// Remove tokens and cached user. Every key is attempted even if an
/// earlier removal fails; the first error is returned.
pub fn clear_session(store: &dyn TokenStore) -> Result<(), StoreError> {
    let mut first_err = None;
    for key in [keys::ACCESS_TOKEN, keys::REFRESH_TOKEN, keys::USER_DATA] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "Failed to clear stored session key");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}
