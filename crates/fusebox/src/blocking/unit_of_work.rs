// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::errors::Result;
use crate::messages::Event;

use super::repository::{InMemoryRepository, Repository};

/// Blocking form of [`UnitOfWork`][crate::unit_of_work::UnitOfWork].
pub trait UnitOfWork: Send + 'static {
    /// The repository this unit of work exposes.
    type Contexts: Repository;

    /// Returns the repository view.
    fn contexts(&mut self) -> &mut Self::Contexts;

    /// Drains the events the repository recorded since the last collection, oldest
    /// first.
    fn collect_new_events(&mut self) -> Vec<Event>;

    /// Makes the work performed in this scope durable.
    fn commit(&mut self) -> Result<()>;

    /// Discards the work performed in this scope.
    fn rollback(&mut self) -> Result<()>;
}

/// Blocking unit of work over an [`InMemoryRepository`].
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

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}
