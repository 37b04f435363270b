// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Blocking surface of the Redis-backed repository, for use with
//! [`fusebox::blocking`].

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use fusebox::blocking::{Repository, UnitOfWork};
use fusebox::{Event, Result, SharedContext, StateName};
use redis::Commands;
use thiserror::Error;
use tracing::debug;

use crate::document::{ContextDocument, context_key, failure_count_key, store_error, to_epoch_seconds};

const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because the circuit state can no longer be trusted";

/// Blocking form of [`KeyValueStore`][crate::KeyValueStore].
pub trait KeyValueStore: Send + 'static {
    /// Opens the backing connection. Must be called before any other operation.
    fn initialize(&mut self) -> Result<()>;

    /// Reads a key, or `None` when it does not exist.
    fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Writes a key, replacing any previous value.
    fn set(&mut self, key: &str, value: String) -> Result<()>;

    /// Atomically increments an integer key and returns the new value.
    fn incr(&mut self, key: &str) -> Result<i64>;
}

#[derive(Debug, Error)]
#[error("redis store is not initialized, call initialize() first")]
struct NotInitialized;

/// Blocking [`KeyValueStore`] over a Redis server.
pub struct RedisStore {
    client: redis::Client,
    connection: Option<redis::Connection>,
}

impl RedisStore {
    /// Creates a store for the given Redis URL. No connection is opened until
    /// [`initialize`][KeyValueStore::initialize].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`][fusebox::Error::Store] when the URL does not parse.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_error)?;
        Ok(Self {
            client,
            connection: None,
        })
    }

    fn connection(&mut self) -> Result<&mut redis::Connection> {
        self.connection.as_mut().ok_or_else(|| store_error(NotInitialized))
    }
}

impl KeyValueStore for RedisStore {
    fn initialize(&mut self) -> Result<()> {
        if self.connection.is_none() {
            debug!("connecting to redis");
            let connection = self.client.get_connection().map_err(store_error)?;
            self.connection = Some(connection);
        }
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.connection()?.get(key).map_err(store_error)
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.connection()?.set(key, value).map_err(store_error)
    }

    fn incr(&mut self, key: &str) -> Result<i64> {
        self.connection()?.incr(key, 1).map_err(store_error)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

/// Blocking form of [`RemoteRepository`][crate::RemoteRepository]; the key layout and
/// merge semantics are identical.
#[derive(Debug)]
pub struct RemoteRepository<S> {
    store: S,
    messages: Vec<Event>,
}

impl<S: KeyValueStore> RemoteRepository<S> {
    /// Creates a repository over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            messages: Vec::new(),
        }
    }
}

/// Blocking [`RemoteRepository`] over a Redis server.
pub type RedisRepository = RemoteRepository<RedisStore>;

impl RedisRepository {
    /// Creates a repository for the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`][fusebox::Error::Store] when the URL does not parse.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(RedisStore::new(url)?))
    }
}

impl<S: KeyValueStore> Repository for RemoteRepository<S> {
    fn initialize(&mut self) -> Result<()> {
        self.store.initialize()
    }

    fn get(&mut self, name: &str) -> Result<Option<SharedContext>> {
        let Some(raw) = self.store.get(&context_key(name))? else {
            return Ok(None);
        };
        let document: ContextDocument = serde_json::from_str(&raw).map_err(store_error)?;
        let failure_count = match self.store.get(&failure_count_key(name))? {
            Some(count) => count.parse::<u32>().map_err(store_error)?,
            None => 0,
        };
        let context = document.into_context(failure_count)?;
        Ok(Some(Arc::new(Mutex::new(context))))
    }

    fn register(&mut self, context: SharedContext) -> Result<()> {
        let (document, name, threshold, ttl) = {
            let context = context.lock().expect(ERR_POISONED_LOCK);
            (
                ContextDocument::from_context(&context),
                context.name().to_string(),
                context.threshold(),
                context.ttl(),
            )
        };
        let raw = serde_json::to_string(&document).map_err(store_error)?;
        self.store.set(&context_key(&name), raw)?;
        self.messages.push(Event::CircuitBreakerCreated { name, threshold, ttl });
        Ok(())
    }

    fn update_state(&mut self, name: &str, state: StateName, opened_at: Option<SystemTime>) -> Result<()> {
        let key = context_key(name);
        let Some(raw) = self.store.get(&key)? else {
            // The document was deleted externally; the next get recreates the circuit.
            debug!(circuit = name, "skipping state update for unknown circuit");
            return Ok(());
        };
        let mut document: ContextDocument = serde_json::from_str(&raw).map_err(store_error)?;
        document.state = state;
        document.opened_at = opened_at.map(to_epoch_seconds);
        let raw = serde_json::to_string(&document).map_err(store_error)?;
        self.store.set(&key, raw)
    }

    fn inc_failures(&mut self, name: &str, _failure_count: u32) -> Result<()> {
        // The advisory count is discarded; the store's own increment is the truth.
        let _ = self.store.incr(&failure_count_key(name))?;
        Ok(())
    }

    fn reset_failure(&mut self, name: &str) -> Result<()> {
        self.store.set(&failure_count_key(name), "0".to_string())
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.messages)
    }
}

/// Blocking unit of work over a [`RemoteRepository`].
#[derive(Debug)]
pub struct RemoteUnitOfWork<S> {
    contexts: RemoteRepository<S>,
}

impl<S: KeyValueStore> RemoteUnitOfWork<S> {
    /// Creates a unit of work over the given store.
    pub fn new(store: S) -> Self {
        Self {
            contexts: RemoteRepository::new(store),
        }
    }
}

/// Blocking [`RemoteUnitOfWork`] over a Redis server.
pub type RedisUnitOfWork = RemoteUnitOfWork<RedisStore>;

impl RedisUnitOfWork {
    /// Creates a unit of work for the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`][fusebox::Error::Store] when the URL does not parse.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(RedisStore::new(url)?))
    }
}

impl<S: KeyValueStore> UnitOfWork for RemoteUnitOfWork<S> {
    type Contexts = RemoteRepository<S>;

    fn contexts(&mut self) -> &mut RemoteRepository<S> {
        &mut self.contexts
    }

    fn collect_new_events(&mut self) -> Vec<Event> {
        self.contexts.take_events()
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}
