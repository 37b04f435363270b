// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::constants::ERR_POISONED_LOCK;
use crate::context::{SharedContext, StateName};
use crate::errors::Result;
use crate::messages::Event;

/// Persists and retrieves circuit contexts.
///
/// A repository owns the contexts it stores and hands them out as [`SharedContext`]
/// references. Besides storage, it carries an outbox of events describing what it did;
/// the unit of work drains that outbox into the message bus.
///
/// Only repository operations are allowed to suspend; everything above them (state
/// machine, exclusion policy, bus routing) is synchronous.
#[trait_variant::make(Send)]
pub trait Repository {
    /// Opens the backing resource. Must be called before any other operation on backends
    /// that hold connections.
    async fn initialize(&mut self) -> Result<()>;

    /// Loads the context for `name`, or `None` when the circuit does not exist.
    async fn get(&mut self, name: &str) -> Result<Option<SharedContext>>;

    /// Stores a freshly created context and records a
    /// [`CircuitBreakerCreated`][Event::CircuitBreakerCreated] event.
    ///
    /// Registering is an upsert: re-registering an equal context alters neither the
    /// stored state nor the failure counter.
    async fn register(&mut self, context: SharedContext) -> Result<()>;

    /// Persists a state transition.
    async fn update_state(
        &mut self,
        name: &str,
        state: StateName,
        opened_at: Option<SystemTime>,
    ) -> Result<()>;

    /// Records a counted failure. The count is advisory: backends with native atomic
    /// increments use those and ignore the argument.
    async fn inc_failures(&mut self, name: &str, failure_count: u32) -> Result<()>;

    /// Zeroes the failure counter. Resetting an already-zero counter is a no-op.
    async fn reset_failure(&mut self, name: &str) -> Result<()>;

    /// Drains the repository's own outbox, oldest event first.
    fn take_events(&mut self) -> Vec<Event>;
}

/// Repository keeping every context in process memory.
///
/// Contexts are handed out by reference, so the state-machine mutations a guard performs
/// are immediately visible to every subsequent read. The persistence operations are
/// therefore no-ops: by the time they run, the model has already mutated itself.
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
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn get(&mut self, name: &str) -> Result<Option<SharedContext>> {
        Ok(self.contexts.get(name).map(Arc::clone))
    }

    async fn register(&mut self, context: SharedContext) -> Result<()> {
        let (name, threshold, ttl) = {
            let context = context.lock().expect(ERR_POISONED_LOCK);
            (context.name().to_string(), context.threshold(), context.ttl())
        };
        self.contexts.insert(name.clone(), context);
        self.messages.push(Event::CircuitBreakerCreated { name, threshold, ttl });
        Ok(())
    }

    async fn update_state(
        &mut self,
        _name: &str,
        _state: StateName,
        _opened_at: Option<SystemTime>,
    ) -> Result<()> {
        Ok(())
    }

    async fn inc_failures(&mut self, _name: &str, _failure_count: u32) -> Result<()> {
        Ok(())
    }

    async fn reset_failure(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::context::Context;

    fn shared(context: Context) -> SharedContext {
        Arc::new(Mutex::new(context))
    }

    #[tokio::test]
    async fn get_unknown_circuit_returns_none() {
        let mut repository = InMemoryRepository::new();
        assert!(repository.get("nope").await.expect("get never fails").is_none());
    }

    #[tokio::test]
    async fn register_then_get_returns_the_same_instance() {
        let mut repository = InMemoryRepository::new();
        let context = shared(Context::new("foo", 40, Duration::from_secs(10)));

        repository.register(Arc::clone(&context)).await.expect("register never fails");
        let loaded = repository
            .get("foo")
            .await
            .expect("get never fails")
            .expect("context was registered");

        // By-reference semantics: the stored instance is the one handed back.
        assert!(Arc::ptr_eq(&context, &loaded));
    }

    #[tokio::test]
    async fn register_records_a_created_event() {
        let mut repository = InMemoryRepository::new();
        let context = shared(Context::new("foo", 40, Duration::from_secs(10)));

        repository.register(context).await.expect("register never fails");

        assert_eq!(
            repository.take_events(),
            vec![Event::CircuitBreakerCreated {
                name: "foo".to_string(),
                threshold: 40,
                ttl: Duration::from_secs(10),
            }],
        );
        assert!(repository.take_events().is_empty());
    }

    #[tokio::test]
    async fn mutation_operations_do_not_touch_the_model() {
        let mut repository = InMemoryRepository::new();
        let context = shared(Context::new("foo", 40, Duration::from_secs(10)));
        repository.register(Arc::clone(&context)).await.expect("register never fails");

        repository
            .update_state("foo", StateName::Opened, Some(SystemTime::UNIX_EPOCH))
            .await
            .expect("update_state is a no-op");
        repository.inc_failures("foo", 7).await.expect("inc_failures is a no-op");

        let loaded = repository
            .get("foo")
            .await
            .expect("get never fails")
            .expect("context was registered");
        let loaded = loaded.lock().expect("lock is never poisoned in tests");
        assert_eq!(loaded.state_name(), StateName::Closed);
        assert_eq!(loaded.failure_count(), 0);
    }
}
