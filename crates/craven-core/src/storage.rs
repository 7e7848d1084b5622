//! ============================================================================
//! Safe Storage - Key-value persistence that never fails the caller
//! ============================================================================
//! Browser-style local storage can be unavailable (private mode, quota,
//! corrupted file). `SafeStorage` wraps any `KeyValueStorage` and turns
//! every backend error into a logged warning plus an empty result.
//! ============================================================================

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Key under which gates remember the route a signed-out user wanted
pub const RETURN_TO_KEY: &str = "craven.return_to";

/// Raw key-value backend; errors are allowed here
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Error-swallowing wrapper around a `KeyValueStorage`
#[derive(Clone)]
pub struct SafeStorage {
    inner: Arc<dyn KeyValueStorage>,
}

impl SafeStorage {
    pub fn new(inner: Arc<dyn KeyValueStorage>) -> Self {
        Self { inner }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.inner.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Storage read of '{}' failed: {}", key, e);
                None
            }
        }
    }

    /// Returns whether the value was stored
    pub fn set(&self, key: &str, value: &str) -> bool {
        match self.inner.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Storage write of '{}' failed: {}", key, e);
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.inner.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!("Storage delete of '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Read and decode a JSON value; undecodable entries read as missing
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable storage entry '{}': {}", key, e);
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw),
            Err(e) => {
                warn!("Cannot encode storage entry '{}': {}", key, e);
                false
            }
        }
    }

    /// Read and delete in one step (used for one-shot values like return routes)
    pub fn take(&self, key: &str) -> Option<String> {
        let value = self.get(key)?;
        self.remove(key);
        Some(value)
    }
}

/// Process-local storage; can be switched to an unavailable state
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects every operation
    pub fn unavailable() -> Self {
        let storage = Self::default();
        storage.unavailable.store(true, Ordering::SeqCst);
        storage
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("Storage is unavailable"));
        }
        Ok(())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("Storage lock poisoned: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .map_err(|e| anyhow!("Storage lock poisoned: {}", e))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .map_err(|e| anyhow!("Storage lock poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}
