// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{trace, warn};

use crate::context::SharedContext;
use crate::errors::{Error, Result};
use crate::messages::{Command, CommandKind, Event, EventKind, Message};
use crate::unit_of_work::UnitOfWork;

/// Handles a command dispatched through the bus.
///
/// A command has exactly one handler; its return value is the bus's return value when the
/// command was the initial dispatch. Plain functions register through
/// [`command_handler_fn`].
pub trait CommandHandler<U>: Send + Sync {
    /// Executes the command against the unit of work.
    fn handle<'a>(&'a self, command: &'a Command, uow: &'a mut U) -> BoxFuture<'a, Result<SharedContext>>;
}

/// Handles an event dispatched through the bus.
///
/// Every handler registered for the event's kind runs, in registration order. Plain
/// functions register through [`event_handler_fn`].
pub trait EventHandler<U>: Send + Sync {
    /// Reacts to the event against the unit of work.
    fn handle<'a>(&'a self, event: &'a Event, uow: &'a mut U) -> BoxFuture<'a, Result<()>>;
}

struct FnCommandHandler<F>(F);

impl<U, F> CommandHandler<U> for FnCommandHandler<F>
where
    F: for<'a> Fn(&'a Command, &'a mut U) -> BoxFuture<'a, Result<SharedContext>> + Send + Sync,
{
    fn handle<'a>(&'a self, command: &'a Command, uow: &'a mut U) -> BoxFuture<'a, Result<SharedContext>> {
        (self.0)(command, uow)
    }
}

struct FnEventHandler<F>(F);

impl<U, F> EventHandler<U> for FnEventHandler<F>
where
    F: for<'a> Fn(&'a Event, &'a mut U) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn handle<'a>(&'a self, event: &'a Event, uow: &'a mut U) -> BoxFuture<'a, Result<()>> {
        (self.0)(event, uow)
    }
}

/// Wraps a future-returning function as a [`CommandHandler`].
pub fn command_handler_fn<U, F>(f: F) -> Arc<dyn CommandHandler<U>>
where
    F: for<'a> Fn(&'a Command, &'a mut U) -> BoxFuture<'a, Result<SharedContext>> + Send + Sync + 'static,
    U: 'static,
{
    Arc::new(FnCommandHandler(f))
}

/// Wraps a future-returning function as an [`EventHandler`].
pub fn event_handler_fn<U, F>(f: F) -> Arc<dyn EventHandler<U>>
where
    F: for<'a> Fn(&'a Event, &'a mut U) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    U: 'static,
{
    Arc::new(FnEventHandler(f))
}

/// Routes commands to their single handler and fans events out to observers.
///
/// Dispatch drains a FIFO queue seeded with the initial message. After every handler
/// invocation, events newly collected from the unit of work are appended to the queue
/// tail, so cascades triggered by a handler run to fixpoint before
/// [`handle`][Self::handle] returns.
///
/// Each bus instance carries its own registries; there is no process-wide state.
pub struct MessageBus<U> {
    command_handlers: HashMap<CommandKind, Arc<dyn CommandHandler<U>>>,
    event_handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler<U>>>>,
}

impl<U> Default for MessageBus<U> {
    fn default() -> Self {
        Self {
            command_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
        }
    }
}

impl<U> MessageBus<U> {
    /// Creates a bus with empty registries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a command kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the kind already has a handler; commands
    /// have exactly one.
    pub fn add_command_handler(&mut self, kind: CommandKind, handler: Arc<dyn CommandHandler<U>>) -> Result<()> {
        match self.command_handlers.entry(kind) {
            Entry::Occupied(_) => Err(Error::Configuration(format!(
                "\"{kind}\" command has been registered twice"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Removes the handler for a command kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the kind has no registered handler.
    pub fn remove_command_handler(&mut self, kind: CommandKind) -> Result<()> {
        if self.command_handlers.remove(&kind).is_some() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "\"{kind}\" command has not been registered"
            )))
        }
    }

    /// Appends a handler to the fan-out list for an event kind.
    pub fn add_event_handler(&mut self, kind: EventKind, handler: Arc<dyn EventHandler<U>>) {
        self.event_handlers.entry(kind).or_default().push(handler);
    }

    /// Removes a previously added event handler, identified by pointer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the handler is not registered for the kind.
    pub fn remove_event_handler(&mut self, kind: EventKind, handler: &Arc<dyn EventHandler<U>>) -> Result<()> {
        if let Some(handlers) = self.event_handlers.get_mut(&kind) {
            if let Some(index) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
                drop(handlers.remove(index));
                return Ok(());
            }
        }
        Err(Error::Configuration(format!(
            "\"{kind}\" event has not been registered"
        )))
    }
}

impl<U: UnitOfWork> MessageBus<U> {
    /// Processes a message and everything it cascades into, scoped in the unit of work.
    ///
    /// Commits when the queue drains cleanly; rolls back when a handler fails. Returns
    /// the command handler's result when the initial message was a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] for a command with no registered handler, and
    /// forwards any error raised by a handler or by the unit of work.
    pub async fn handle(&self, message: impl Into<Message>, uow: &mut U) -> Result<Option<SharedContext>> {
        match self.dispatch(message.into(), uow).await {
            Ok(result) => {
                uow.commit().await?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after dispatch error");
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, message: Message, uow: &mut U) -> Result<Option<SharedContext>> {
        let mut queue = VecDeque::from([message]);
        let mut first_command_result = None;
        let mut initial = true;

        while let Some(message) = queue.pop_front() {
            match message {
                Message::Command(command) => {
                    let handler = self
                        .command_handlers
                        .get(&command.kind())
                        .ok_or(Error::InvalidMessage(command.kind()))?;
                    trace!(command = %command.kind(), "dispatching command");
                    let context = handler.handle(&command, uow).await?;
                    if initial {
                        first_command_result = Some(context);
                    }
                    queue.extend(uow.collect_new_events().into_iter().map(Message::Event));
                }
                Message::Event(event) => {
                    trace!(event = %event.kind(), circuit = event.circuit_name(), "dispatching event");
                    if let Some(handlers) = self.event_handlers.get(&event.kind()) {
                        for handler in handlers {
                            handler.handle(&event, uow).await?;
                            queue.extend(uow.collect_new_events().into_iter().map(Message::Event));
                        }
                    }
                }
            }
            initial = false;
        }

        Ok(first_command_result)
    }
}

impl<U> fmt::Debug for MessageBus<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("command_handlers", &self.command_handlers.len())
            .field("event_handlers", &self.event_handlers.len())
            .finish()
    }
}
