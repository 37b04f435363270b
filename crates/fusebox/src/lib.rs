// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Named circuit breakers with pluggable state storage.
//!
//! A circuit breaker wraps calls to an unreliable collaborator (a remote service, a
//! database, a downstream process) and short-circuits them when consecutive failures
//! exceed a threshold, giving the collaborator time to recover while callers fail fast.
//!
//! Each circuit is a named state machine with three states:
//!
//! - **closed**: calls flow through and consecutive failures are counted;
//! - **opened**: calls are refused with [`Error::CircuitOpen`] until the configured TTL
//!   elapses;
//! - **half-opened**: one probe call is admitted and decides whether the circuit closes
//!   again or re-opens.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fusebox::{CallError, CircuitBreakerFactory};
//! use tick::Clock;
//!
//! # async fn demo() -> Result<(), fusebox::Error> {
//! let clock = Clock::new_tokio();
//! let factory = CircuitBreakerFactory::builder(&clock)
//!     .default_threshold(5)
//!     .default_ttl(Duration::from_secs(30))
//!     .build();
//!
//! let breaker = factory.get_breaker("invoices").await?;
//! match breaker.call(|| fetch_invoice()).await {
//!     Ok(invoice) => println!("got {invoice}"),
//!     Err(err) if err.is_open() => println!("invoice service is on a break"),
//!     Err(CallError::Service(err)) => println!("invoice service failed: {err}"),
//!     Err(CallError::Circuit(err)) => println!("breaker machinery failed: {err}"),
//! }
//! # Ok(())
//! # }
//! # async fn fetch_invoice() -> Result<String, std::io::Error> { Ok("inv-1".to_string()) }
//! ```
//!
//! # Classifying failures
//!
//! Not every error should trip the circuit. [`ExcludeRule`] marks error types (optionally
//! qualified by a predicate) as non-failures; an excluded error still propagates to the
//! caller but counts as a success for the circuit:
//!
//! ```
//! use fusebox::ExcludeRule;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("http {status}")]
//! struct HttpError {
//!     status: u16,
//! }
//!
//! // 4xx means the collaborator is healthy and the request was wrong.
//! let rule = ExcludeRule::when(|e: &HttpError| e.status < 500);
//! ```
//!
//! # Shared circuit state
//!
//! By default circuits live in process memory. Pointing the factory at a shared store
//! (see the `fusebox_redis` crate) makes every client process see the same circuit
//! state: when one client opens a circuit, the others start refusing calls too. The
//! shared store is eventually consistent; failure counters merge through atomic
//! increments and state documents are last-writer-wins.
//!
//! # Observing circuits
//!
//! State changes travel as [`Event`] records through a per-factory [`MessageBus`]: the
//! factory's internal handlers persist each change through the repository, then notify
//! every listener registered with
//! [`add_listener`][CircuitBreakerFactory::add_listener].
//!
//! # Blocking surface
//!
//! The [`blocking`] module mirrors the whole API for callers without an async runtime.
//! Only repository operations ever suspend; the state machine itself is synchronous and
//! pure in both surfaces.

pub mod blocking;
pub mod bus;
pub mod context;
pub mod errors;
pub mod exclude;
pub mod factory;
pub mod listener;
pub mod messages;
pub mod repository;
pub mod unit_of_work;

mod constants;
mod handlers;

pub use bus::MessageBus;
pub use context::{Context, SharedContext, State, StateName};
pub use errors::{CallError, Error, Result};
pub use exclude::ExcludeRule;
pub use factory::{BreakerOptions, CircuitBreaker, CircuitBreakerFactory, FactoryBuilder};
pub use listener::CircuitBreakerListener;
pub use messages::{Command, CommandKind, Event, EventKind, Message};
pub use repository::{InMemoryRepository, Repository};
pub use unit_of_work::{InMemoryUnitOfWork, UnitOfWork};
