// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::messages::{Event, EventKind};

/// Observer notified of every public circuit event.
///
/// Listeners are registered on a factory and invoked synchronously, in registration
/// order, while the factory dispatches events. They receive the circuit name, the stable
/// event kind string (via [`EventKind`]), and the event record itself.
///
/// Implemented for any matching closure:
///
/// ```
/// use fusebox::{CircuitBreakerListener, Event, EventKind};
///
/// let listener = |circuit: &str, kind: EventKind, _event: &Event| {
///     println!("{circuit}: {kind}");
/// };
/// let _boxed: std::sync::Arc<dyn CircuitBreakerListener> = std::sync::Arc::new(listener);
/// ```
pub trait CircuitBreakerListener: Send + Sync {
    /// Called once per event, after the event was persisted.
    fn on_event(&self, circuit: &str, kind: EventKind, event: &Event);
}

impl<F> CircuitBreakerListener for F
where
    F: Fn(&str, EventKind, &Event) + Send + Sync,
{
    fn on_event(&self, circuit: &str, kind: EventKind, event: &Event) {
        self(circuit, kind, event);
    }
}
