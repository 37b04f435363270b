// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed circuit state storage for the `fusebox` circuit breaker.
//!
//! Pointing a [`CircuitBreakerFactory`][fusebox::CircuitBreakerFactory] at a
//! [`RedisUnitOfWork`] makes circuit state live in a shared store instead of process
//! memory, so many client processes observe the same circuits: when one client opens a
//! circuit, the others start refusing calls as soon as they re-read it.
//!
//! Each circuit occupies two keys:
//!
//! - `cbr::{name}`: a JSON document `{name, state, opened_at, threshold, ttl}`, written
//!   last-writer-wins;
//! - `cbr::{name}::failure_count`: an integer counter, updated with the store's atomic
//!   `INCR` so concurrent clients merge their failures instead of overwriting them.
//!
//! The store is eventually consistent. Two clients racing to open the same circuit both
//! mark it opened, and counter resets after recovery are idempotent.
//!
//! # Quick start
//!
//! ```no_run
//! use fusebox::CircuitBreakerFactory;
//! use fusebox_redis::RedisUnitOfWork;
//! use tick::Clock;
//!
//! # async fn demo() -> Result<(), fusebox::Error> {
//! let clock = Clock::new_tokio();
//! let uow = RedisUnitOfWork::from_url("redis://localhost:6379")?;
//! let factory = CircuitBreakerFactory::builder(&clock).build_with(uow);
//! factory.initialize().await?;
//!
//! let breaker = factory.get_breaker("invoices").await?;
//! # let _ = breaker;
//! # Ok(())
//! # }
//! ```
//!
//! # Other stores
//!
//! The repository is generic over [`KeyValueStore`], the minimal `get`/`set`/`incr`
//! capability set. Any store offering these semantics can stand in for Redis, which is
//! also how the tests run against an in-memory fake.
//!
//! # Blocking surface
//!
//! The [`blocking`] module mirrors everything here over a synchronous Redis connection,
//! for use with [`fusebox::blocking`].

pub mod blocking;

mod document;
mod repository;
mod store;

pub use repository::{RedisRepository, RedisUnitOfWork, RemoteRepository, RemoteUnitOfWork};
pub use store::{KeyValueStore, RedisStore};
