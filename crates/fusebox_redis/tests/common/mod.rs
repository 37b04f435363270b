// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code, reason = "shared helpers; not every test crate uses every item")]

//! Shared test helpers: an in-memory [`KeyValueStore`] standing in for a Redis server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fusebox::{Error, Result};

#[derive(Debug, thiserror::Error)]
#[error("boom")]
pub struct Boom;

/// In-memory key-value store with Redis `get`/`set`/`incr` semantics.
///
/// Clones share the underlying map, so a test can keep a handle for inspecting what the
/// repository wrote. Initialization is tracked per instance, like a connection would be.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    initialized: bool,
    storage: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything stored, keyed as the repository wrote it.
    pub fn contents(&self) -> HashMap<String, String> {
        self.storage.lock().expect("test lock").clone()
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        if !self.initialized {
            return Err(Error::Store("store is not initialized".into()));
        }
        Ok(self.storage.lock().expect("test lock"))
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn set_value(&mut self, key: &str, value: String) -> Result<()> {
        let _ = self.guard()?.insert(key.to_string(), value);
        Ok(())
    }

    fn incr_value(&mut self, key: &str) -> Result<i64> {
        let mut storage = self.guard()?;
        let value = storage.get(key).map_or(0, |v| v.parse().unwrap_or(0)) + 1;
        let _ = storage.insert(key.to_string(), value.to_string());
        Ok(value)
    }
}

impl fusebox_redis::KeyValueStore for MemoryStore {
    async fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.get_value(key)
    }

    async fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.set_value(key, value)
    }

    async fn incr(&mut self, key: &str) -> Result<i64> {
        self.incr_value(key)
    }
}

impl fusebox_redis::blocking::KeyValueStore for MemoryStore {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.get_value(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.set_value(key, value)
    }

    fn incr(&mut self, key: &str) -> Result<i64> {
        self.incr_value(key)
    }
}
