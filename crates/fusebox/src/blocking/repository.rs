// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::constants::ERR_POISONED_LOCK;
use crate::context::{SharedContext, StateName};
use crate::errors::Result;
use crate::messages::Event;

/// Blocking form of [`Repository`][crate::repository::Repository].
///
/// The capability set is identical; operations block instead of suspending.
pub trait Repository: Send {
    /// Opens the backing resource.
    fn initialize(&mut self) -> Result<()>;

    /// Loads the context for `name`, or `None` when the circuit does not exist.
    fn get(&mut self, name: &str) -> Result<Option<SharedContext>>;

    /// Stores a freshly created context and records a
    /// [`CircuitBreakerCreated`][Event::CircuitBreakerCreated] event.
    fn register(&mut self, context: SharedContext) -> Result<()>;

    /// Persists a state transition.
    fn update_state(&mut self, name: &str, state: StateName, opened_at: Option<SystemTime>) -> Result<()>;

    /// Records a counted failure; the count is advisory for backends with native
    /// atomic increments.
    fn inc_failures(&mut self, name: &str, failure_count: u32) -> Result<()>;

    /// Zeroes the failure counter.
    fn reset_failure(&mut self, name: &str) -> Result<()>;

    /// Drains the repository's own outbox, oldest event first.
    fn take_events(&mut self) -> Vec<Event>;
}

/// Blocking in-memory repository; see
/// [`repository::InMemoryRepository`][crate::repository::InMemoryRepository] for the
/// shared-instance semantics.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    contexts: HashMap<String, SharedContext>,
    messages: Vec<Event>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemoryRepository {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn get(&mut self, name: &str) -> Result<Option<SharedContext>> {
        Ok(self.contexts.get(name).map(Arc::clone))
    }

    fn register(&mut self, context: SharedContext) -> Result<()> {
        let (name, threshold, ttl) = {
            let context = context.lock().expect(ERR_POISONED_LOCK);
            (context.name().to_string(), context.threshold(), context.ttl())
        };
        self.contexts.insert(name.clone(), context);
        self.messages.push(Event::CircuitBreakerCreated { name, threshold, ttl });
        Ok(())
    }

    fn update_state(&mut self, _name: &str, _state: StateName, _opened_at: Option<SystemTime>) -> Result<()> {
        Ok(())
    }

    fn inc_failures(&mut self, _name: &str, _failure_count: u32) -> Result<()> {
        Ok(())
    }

    fn reset_failure(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.messages)
    }
}
