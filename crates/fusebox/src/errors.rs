// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::messages::CommandKind;

/// Any error produced by the circuit breaker machinery itself.
///
/// Errors raised by guarded user operations are never wrapped in this type; they travel
/// through [`CallError::Service`] unchanged.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The circuit refused entry because it is currently open.
    ///
    /// This is an expected, non-fatal outcome that callers are meant to match on. It
    /// signals "the upstream refused the call", as opposed to "the call failed".
    #[error("circuit breaker \"{name}\" is open")]
    CircuitOpen {
        /// Name of the refusing circuit.
        name: String,
    },

    /// A handler or listener registration was used incorrectly, e.g. registering a
    /// command handler twice or removing a handler that was never registered.
    ///
    /// This is a programmer error and raised synchronously at the call site.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A command reached the bus with no handler registered for it.
    ///
    /// This indicates a wiring bug: the factory registers handlers for every command it
    /// dispatches, so this can only occur on a hand-assembled bus.
    #[error("invalid message: no handler registered for command \"{0}\"")]
    InvalidMessage(CommandKind),

    /// We are forwarding an error raised by the backing state store.
    ///
    /// The in-memory state may diverge from persistence once this is returned; the
    /// library makes no attempt to retry or reconcile.
    #[error(transparent)]
    Store(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A specialized `Result` for circuit breaker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The outcome of a guarded call, distinguishing breaker-level failures from failures of
/// the wrapped operation itself.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker machinery failed: the circuit refused entry, or persisting the
    /// resulting state change failed.
    #[error(transparent)]
    Circuit(#[from] Error),

    /// The guarded operation failed. The error is propagated unchanged.
    #[error(transparent)]
    Service(E),
}

impl<E> CallError<E> {
    /// Returns `true` when the call was refused because the circuit is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Circuit(Error::CircuitOpen { .. }))
    }

    /// Returns the error of the guarded operation, if that is what failed.
    pub fn into_service_error(self) -> Option<E> {
        match self {
            Self::Circuit(_) => None,
            Self::Service(e) => Some(e),
        }
    }
}
