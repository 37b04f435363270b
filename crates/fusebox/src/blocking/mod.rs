// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Blocking surface of the circuit breaker.
//!
//! This module mirrors the crate's async API for callers without an async runtime. The
//! domain layer (contexts, exclusion rules, messages, errors) is shared with the async
//! surface; only the pieces that touch the repository differ, because repository
//! operations are the single place where the async surface suspends.
//!
//! ```
//! use fusebox::blocking::CircuitBreakerFactory;
//! use tick::runtime::InactiveClock;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (clock, _driver) = InactiveClock::default().activate();
//! let factory = CircuitBreakerFactory::builder(&clock).build();
//!
//! let breaker = factory.get_breaker("payments")?;
//! let outcome = breaker.call(|| charge_card());
//! # let _ = outcome;
//! # Ok(())
//! # }
//! # fn charge_card() -> Result<(), std::io::Error> { Ok(()) }
//! ```

mod bus;
mod factory;
mod repository;
mod unit_of_work;

pub use bus::{CommandHandler, EventHandler, MessageBus, command_handler_fn, event_handler_fn};
pub use factory::{CircuitBreaker, CircuitBreakerFactory, FactoryBuilder};
pub use repository::{InMemoryRepository, Repository};
pub use unit_of_work::{InMemoryUnitOfWork, UnitOfWork};

pub(crate) mod handlers;
