// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use fusebox::{Event, Repository, Result, SharedContext, StateName, UnitOfWork};
use tracing::debug;

use crate::document::{ContextDocument, context_key, failure_count_key, store_error, to_epoch_seconds};
use crate::store::{KeyValueStore, RedisStore};

const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because the circuit state can no longer be trusted";

/// Repository persisting circuits in a shared key-value store.
///
/// Each circuit uses two keys: `cbr::{name}` holds the JSON state document
/// (last-writer-wins) and `cbr::{name}::failure_count` holds the counter, merged across
/// clients through the store's atomic increment. Every read rebuilds a fresh context, so
/// each client process keeps its own cache and the store is the synchronization point.
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

/// [`RemoteRepository`] over a Redis server.
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
    async fn initialize(&mut self) -> Result<()> {
        self.store.initialize().await
    }

    async fn get(&mut self, name: &str) -> Result<Option<SharedContext>> {
        let Some(raw) = self.store.get(&context_key(name)).await? else {
            return Ok(None);
        };
        let document: ContextDocument = serde_json::from_str(&raw).map_err(store_error)?;
        let failure_count = match self.store.get(&failure_count_key(name)).await? {
            Some(count) => count.parse::<u32>().map_err(store_error)?,
            None => 0,
        };
        let context = document.into_context(failure_count)?;
        Ok(Some(Arc::new(Mutex::new(context))))
    }

    async fn register(&mut self, context: SharedContext) -> Result<()> {
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
        self.store.set(&context_key(&name), raw).await?;
        self.messages.push(Event::CircuitBreakerCreated { name, threshold, ttl });
        Ok(())
    }

    async fn update_state(&mut self, name: &str, state: StateName, opened_at: Option<SystemTime>) -> Result<()> {
        let key = context_key(name);
        let Some(raw) = self.store.get(&key).await? else {
            // The document was deleted externally; the next get recreates the circuit.
            debug!(circuit = name, "skipping state update for unknown circuit");
            return Ok(());
        };
        let mut document: ContextDocument = serde_json::from_str(&raw).map_err(store_error)?;
        document.state = state;
        document.opened_at = opened_at.map(to_epoch_seconds);
        let raw = serde_json::to_string(&document).map_err(store_error)?;
        self.store.set(&key, raw).await
    }

    async fn inc_failures(&mut self, name: &str, _failure_count: u32) -> Result<()> {
        // The advisory count is discarded; the store's own increment is the truth, so
        // concurrent clients merge instead of overwriting each other.
        let _ = self.store.incr(&failure_count_key(name)).await?;
        Ok(())
    }

    async fn reset_failure(&mut self, name: &str) -> Result<()> {
        self.store.set(&failure_count_key(name), "0".to_string()).await
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.messages)
    }
}

/// Unit of work over a [`RemoteRepository`].
///
/// Store writes are immediate, so commit and rollback have nothing to do; a failed
/// dispatch leaves the in-memory context best-effort ahead of the store.
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

/// [`RemoteUnitOfWork`] over a Redis server.
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

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}
