// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::errors::Result;
use crate::messages::Event;
use crate::repository::{InMemoryRepository, Repository};

/// A consistent view over a repository with a commit/rollback lifecycle.
///
/// The message bus scopes every dispatch in a unit of work: it commits after the queue
/// drains cleanly and rolls back when a handler fails. Backends without transactions
/// implement both as no-ops.
#[trait_variant::make(Send)]
pub trait UnitOfWork: 'static {
    /// The repository this unit of work exposes.
    type Contexts: Repository;

    /// Returns the repository view.
    fn contexts(&mut self) -> &mut Self::Contexts;

    /// Drains the events the repository recorded since the last collection, oldest
    /// first.
    fn collect_new_events(&mut self) -> Vec<Event>;

    /// Makes the work performed in this scope durable.
    async fn commit(&mut self) -> Result<()>;

    /// Discards the work performed in this scope.
    async fn rollback(&mut self) -> Result<()>;
}

/// Unit of work over an [`InMemoryRepository`].
///
/// Memory writes are immediate, so commit and rollback have nothing to do.
#[derive(Debug, Default)]
pub struct InMemoryUnitOfWork {
    contexts: InMemoryRepository,
}

impl InMemoryUnitOfWork {
    /// Creates a unit of work over an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    type Contexts = InMemoryRepository;

    fn contexts(&mut self) -> &mut InMemoryRepository {
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
