// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Blocking forms of the factory's internal message handlers.

use std::sync::{Arc, Mutex};

use crate::context::{Context, SharedContext};
use crate::errors::Result;
use crate::messages::{Command, Event};

use super::repository::Repository;
use super::unit_of_work::UnitOfWork;

pub(crate) fn register_circuit_breaker<U: UnitOfWork>(command: &Command, uow: &mut U) -> Result<SharedContext> {
    let Command::CreateCircuitBreaker { name, threshold, ttl } = command;
    let context = Arc::new(Mutex::new(Context::new(name.clone(), *threshold, *ttl)));
    uow.contexts().register(Arc::clone(&context))?;
    Ok(context)
}

pub(crate) fn persist_event<U: UnitOfWork>(event: &Event, uow: &mut U) -> Result<()> {
    match event {
        Event::ContextChanged { name, state, opened_at } => uow.contexts().update_state(name, *state, *opened_at),
        Event::CircuitBreakerFailed { name, failure_count } => uow.contexts().inc_failures(name, *failure_count),
        Event::CircuitBreakerRecovered { name } => uow.contexts().reset_failure(name),
        // Creation is persisted by the register call itself.
        Event::CircuitBreakerCreated { .. } => Ok(()),
    }
}
