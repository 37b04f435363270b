// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use fusebox::Result;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::debug;

use crate::document::store_error;

/// The store operations the remote repository needs.
///
/// Any key-value store offering these semantics works: `get`/`set` with last-writer-wins
/// strings and an atomic integer `incr`. The trait is the seam tests use to substitute an
/// in-memory fake for a live server.
#[trait_variant::make(Send)]
pub trait KeyValueStore: 'static {
    /// Opens the backing connection. Must be called before any other operation.
    async fn initialize(&mut self) -> Result<()>;

    /// Reads a key, or `None` when it does not exist.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Writes a key, replacing any previous value.
    async fn set(&mut self, key: &str, value: String) -> Result<()>;

    /// Atomically increments an integer key, creating it at zero first if missing, and
    /// returns the new value.
    async fn incr(&mut self, key: &str) -> Result<i64>;
}

#[derive(Debug, Error)]
#[error("redis store is not initialized, call initialize() first")]
struct NotInitialized;

/// [`KeyValueStore`] over a Redis server, using a self-healing connection manager.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    connection: Option<ConnectionManager>,
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

    fn connection(&mut self) -> Result<&mut ConnectionManager> {
        self.connection.as_mut().ok_or_else(|| store_error(NotInitialized))
    }
}

impl KeyValueStore for RedisStore {
    async fn initialize(&mut self) -> Result<()> {
        if self.connection.is_none() {
            debug!("connecting to redis");
            let connection = self.client.get_connection_manager().await.map_err(store_error)?;
            self.connection = Some(connection);
        }
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.connection()?.get(key).await.map_err(store_error)
    }

    async fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.connection()?.set(key, value).await.map_err(store_error)
    }

    async fn incr(&mut self, key: &str) -> Result<i64> {
        self.connection()?.incr(key, 1).await.map_err(store_error)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}
