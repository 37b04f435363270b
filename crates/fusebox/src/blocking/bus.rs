// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::context::SharedContext;
use crate::errors::{Error, Result};
use crate::messages::{Command, CommandKind, Event, EventKind, Message};

use super::unit_of_work::UnitOfWork;

/// Blocking form of [`CommandHandler`][crate::bus::CommandHandler].
pub trait CommandHandler<U>: Send + Sync {
    /// Executes the command against the unit of work.
    fn handle(&self, command: &Command, uow: &mut U) -> Result<SharedContext>;
}

/// Blocking form of [`EventHandler`][crate::bus::EventHandler].
pub trait EventHandler<U>: Send + Sync {
    /// Reacts to the event against the unit of work.
    fn handle(&self, event: &Event, uow: &mut U) -> Result<()>;
}

struct FnCommandHandler<F>(F);

impl<U, F> CommandHandler<U> for FnCommandHandler<F>
where
    F: Fn(&Command, &mut U) -> Result<SharedContext> + Send + Sync,
{
    fn handle(&self, command: &Command, uow: &mut U) -> Result<SharedContext> {
        (self.0)(command, uow)
    }
}

struct FnEventHandler<F>(F);

impl<U, F> EventHandler<U> for FnEventHandler<F>
where
    F: Fn(&Event, &mut U) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &Event, uow: &mut U) -> Result<()> {
        (self.0)(event, uow)
    }
}

/// Wraps a function as a blocking [`CommandHandler`].
pub fn command_handler_fn<U, F>(f: F) -> Arc<dyn CommandHandler<U>>
where
    F: Fn(&Command, &mut U) -> Result<SharedContext> + Send + Sync + 'static,
    U: 'static,
{
    Arc::new(FnCommandHandler(f))
}

/// Wraps a function as a blocking [`EventHandler`].
pub fn event_handler_fn<U, F>(f: F) -> Arc<dyn EventHandler<U>>
where
    F: Fn(&Event, &mut U) -> Result<()> + Send + Sync + 'static,
    U: 'static,
{
    Arc::new(FnEventHandler(f))
}

/// Blocking form of [`MessageBus`][crate::bus::MessageBus]; routing semantics are
/// identical, handlers block instead of suspending.
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
    /// Returns [`Error::Configuration`] when the kind already has a handler.
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
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] for a command with no registered handler, and
    /// forwards any error raised by a handler or by the unit of work.
    pub fn handle(&self, message: impl Into<Message>, uow: &mut U) -> Result<Option<SharedContext>> {
        match self.dispatch(message.into(), uow) {
            Ok(result) => {
                uow.commit()?;
                Ok(result)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback() {
                    warn!(error = %rollback_err, "rollback failed after dispatch error");
                }
                Err(err)
            }
        }
    }

    fn dispatch(&self, message: Message, uow: &mut U) -> Result<Option<SharedContext>> {
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
                    let context = handler.handle(&command, uow)?;
                    if initial {
                        first_command_result = Some(context);
                    }
                    queue.extend(uow.collect_new_events().into_iter().map(Message::Event));
                }
                Message::Event(event) => {
                    trace!(event = %event.kind(), circuit = event.circuit_name(), "dispatching event");
                    if let Some(handlers) = self.event_handlers.get(&event.kind()) {
                        for handler in handlers {
                            handler.handle(&event, uow)?;
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
