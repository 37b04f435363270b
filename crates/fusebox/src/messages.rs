// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::context::StateName;

/// A command crossing the message bus.
///
/// Commands are imperative requests routed to exactly one handler; the handler's return
/// value is surfaced by the bus.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Command {
    /// Create and register a new circuit with the given settings.
    CreateCircuitBreaker {
        /// Name of the circuit to create.
        name: String,
        /// Number of consecutive failures before the circuit opens.
        threshold: u32,
        /// Duration the circuit stays open before admitting a probe.
        ttl: Duration,
    },
}

impl Command {
    /// Returns the registry key for this command.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateCircuitBreaker { .. } => CommandKind::CreateCircuitBreaker,
        }
    }
}

/// Registry key identifying a command variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CommandKind {
    /// Key for [`Command::CreateCircuitBreaker`].
    CreateCircuitBreaker,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateCircuitBreaker => f.write_str("create_circuit_breaker"),
        }
    }
}

/// An event crossing the message bus.
///
/// Events are records of something that already happened. They fan out to every
/// registered handler in registration order.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// A circuit was created and registered.
    CircuitBreakerCreated {
        /// Name of the new circuit.
        name: String,
        /// Configured failure threshold.
        threshold: u32,
        /// Configured open-state duration.
        ttl: Duration,
    },

    /// A circuit transitioned to a new state.
    ContextChanged {
        /// Name of the circuit.
        name: String,
        /// The state the circuit transitioned to.
        state: StateName,
        /// When the circuit opened; set iff `state` is [`StateName::Opened`].
        opened_at: Option<SystemTime>,
    },

    /// A guarded call failed and was counted against the threshold.
    CircuitBreakerFailed {
        /// Name of the circuit.
        name: String,
        /// The failure count after this failure.
        failure_count: u32,
    },

    /// A circuit recovered: a guarded call succeeded after one or more failures.
    CircuitBreakerRecovered {
        /// Name of the circuit.
        name: String,
    },
}

impl Event {
    /// Returns the registry key for this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CircuitBreakerCreated { .. } => EventKind::CircuitBreakerCreated,
            Self::ContextChanged { .. } => EventKind::StateChanged,
            Self::CircuitBreakerFailed { .. } => EventKind::Failed,
            Self::CircuitBreakerRecovered { .. } => EventKind::Recovered,
        }
    }

    /// Returns the name of the circuit this event concerns.
    #[must_use]
    pub fn circuit_name(&self) -> &str {
        match self {
            Self::CircuitBreakerCreated { name, .. }
            | Self::ContextChanged { name, .. }
            | Self::CircuitBreakerFailed { name, .. }
            | Self::CircuitBreakerRecovered { name } => name,
        }
    }
}

/// Registry key identifying an event variant.
///
/// The [`Display`][fmt::Display] form is the stable string handed to listeners:
/// `circuit_breaker_created`, `state_changed`, `failed`, `recovered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    /// Key for [`Event::CircuitBreakerCreated`].
    CircuitBreakerCreated,
    /// Key for [`Event::ContextChanged`].
    StateChanged,
    /// Key for [`Event::CircuitBreakerFailed`].
    Failed,
    /// Key for [`Event::CircuitBreakerRecovered`].
    Recovered,
}

impl EventKind {
    pub(crate) const ALL: [Self; 4] = [
        Self::CircuitBreakerCreated,
        Self::StateChanged,
        Self::Failed,
        Self::Recovered,
    ];

    /// Returns the stable string form of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CircuitBreakerCreated => "circuit_breaker_created",
            Self::StateChanged => "state_changed",
            Self::Failed => "failed",
            Self::Recovered => "recovered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either a [`Command`] or an [`Event`], as queued on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// An imperative request with a single handler.
    Command(Command),
    /// A record of something that happened, fanned out to observers.
    Event(Event),
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}
