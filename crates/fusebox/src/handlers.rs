// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The factory's internal message handlers.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::context::{Context, SharedContext};
use crate::errors::Result;
use crate::messages::{Command, Event};
use crate::repository::Repository;
use crate::unit_of_work::UnitOfWork;

/// Creates the context for a new circuit and registers it; the repository records the
/// matching created event.
pub(crate) fn register_circuit_breaker<'a, U: UnitOfWork>(
    command: &'a Command,
    uow: &'a mut U,
) -> BoxFuture<'a, Result<SharedContext>> {
    Box::pin(async move {
        let Command::CreateCircuitBreaker { name, threshold, ttl } = command;
        let context = Arc::new(Mutex::new(Context::new(name.clone(), *threshold, *ttl)));
        uow.contexts().register(Arc::clone(&context)).await?;
        Ok(context)
    })
}

/// Forwards a state-machine event to the matching persistence operation.
pub(crate) fn persist_event<'a, U: UnitOfWork>(event: &'a Event, uow: &'a mut U) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        match event {
            Event::ContextChanged { name, state, opened_at } => {
                uow.contexts().update_state(name, *state, *opened_at).await
            }
            Event::CircuitBreakerFailed { name, failure_count } => {
                uow.contexts().inc_failures(name, *failure_count).await
            }
            Event::CircuitBreakerRecovered { name } => uow.contexts().reset_failure(name).await,
            // Creation is persisted by the register call itself.
            Event::CircuitBreakerCreated { .. } => Ok(()),
        }
    })
}
