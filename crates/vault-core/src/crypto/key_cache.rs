//! Process-wide cache of derived keys
//!
//! PBKDF2 costs on the order of a hundred milliseconds per call, so every open,
//! create and save goes through this cache. Entries are keyed by password and
//! remember the salt they were derived with; a lookup with a different salt
//! re-derives and replaces the entry.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::key_derivation::{derive_key, Salt};
use super::MasterKey;
use crate::error::{Result, VaultError};

struct CachedKey {
    salt: Salt,
    key: MasterKey,
}

/// Password -> derived key cache, shared between operations as `Arc<KeyCache>`
#[derive(Default)]
pub struct KeyCache {
    entries: RwLock<HashMap<String, CachedKey>>,
}

impl KeyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key for `password`, deriving and storing it on a miss
    pub async fn get_or_derive(&self, password: &str, salt: &Salt) -> Result<MasterKey> {
        if let Some(cached) = self.entries.read().await.get(password) {
            if cached.salt == *salt {
                return Ok(cached.key.clone());
            }
        }

        let owned_password = Zeroizing::new(password.to_owned());
        let owned_salt = *salt;
        let key = tokio::task::spawn_blocking(move || derive_key(&owned_password, &owned_salt))
            .await
            .map_err(|e| VaultError::KeyDerivationError(e.to_string()))?;

        let mut entries = self.entries.write().await;
        entries.insert(
            password.to_owned(),
            CachedKey {
                salt: *salt,
                key: key.clone(),
            },
        );
        debug!("Derived key cached ({} entries)", entries.len());

        Ok(key)
    }

    /// Evict the entry for `password`; returns whether one was present
    pub async fn remove(&self, password: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove_entry(password) {
            Some((mut stored_password, _)) => {
                stored_password.zeroize();
                debug!("Evicted cached key ({} entries left)", entries.len());
                true
            }
            None => false,
        }
    }

    /// Whether a key for `password` is cached
    pub async fn contains(&self, password: &str) -> bool {
        self.entries.read().await.contains_key(password)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every cached key
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        for (mut password, _) in entries.drain() {
            password.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache").finish_non_exhaustive()
    }
}
