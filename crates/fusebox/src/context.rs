// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::errors::{Error, Result};
use crate::exclude::{self, ExcludeRule};
use crate::messages::Event;

/// The state of a circuit, including the data that only exists in that state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    /// Calls flow through; consecutive failures are counted.
    Closed {
        /// Number of consecutive failures observed so far.
        failure_count: u32,
    },

    /// Calls are refused until the TTL elapses.
    Opened {
        /// When the circuit opened.
        opened_at: SystemTime,
    },

    /// One probe call decides whether to close or re-open.
    HalfOpened,
}

impl State {
    /// Returns the name of this state, without its data.
    #[must_use]
    pub fn name(&self) -> StateName {
        match self {
            Self::Closed { .. } => StateName::Closed,
            Self::Opened { .. } => StateName::Opened,
            Self::HalfOpened => StateName::HalfOpened,
        }
    }

    /// Returns when the circuit opened, iff it is currently open.
    #[must_use]
    pub fn opened_at(&self) -> Option<SystemTime> {
        match self {
            Self::Opened { opened_at } => Some(*opened_at),
            _ => None,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::Closed { failure_count: 0 }
    }
}

/// The name of a circuit state, detached from its data.
///
/// The [`Display`][std::fmt::Display] form (`closed`, `opened`, `half-opened`) is stable
/// and is what storage backends persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum StateName {
    /// The circuit allows calls.
    Closed,
    /// The circuit refuses calls.
    Opened,
    /// The circuit admits one probe.
    HalfOpened,
}

impl StateName {
    /// Returns the stable string form of this state name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opened => "opened",
            Self::HalfOpened => "half-opened",
        }
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A context shared between the repository that owns it and the guards that borrow it.
///
/// The mutex is only ever held for the duration of a single non-suspending state-machine
/// call, never across I/O.
pub type SharedContext = Arc<Mutex<Context>>;

/// The stateful record for one named circuit.
///
/// A context tracks the circuit state, counts failures, and records every state change as
/// an [`Event`] in its outbox. It performs no I/O and never reads a clock: the current
/// time enters as an argument, and the outbox is drained by the enclosing guard.
#[derive(Debug)]
pub struct Context {
    name: String,
    threshold: u32,
    ttl: Duration,
    state: State,
    exclude: Vec<ExcludeRule>,
    outbox: Vec<Event>,
}

impl Context {
    /// Creates a closed context with a zero failure count.
    #[must_use]
    pub fn new(name: impl Into<String>, threshold: u32, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            threshold,
            ttl,
            state: State::default(),
            exclude: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Rebuilds a context from persisted parts.
    ///
    /// Unlike [`set_state`][Self::set_state], restoring does not emit events; the state
    /// change already happened elsewhere.
    #[must_use]
    pub fn restore(name: impl Into<String>, threshold: u32, ttl: Duration, state: State) -> Self {
        Self {
            name: name.into(),
            threshold,
            ttl,
            state,
            exclude: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Returns the name of the circuit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of consecutive failures before the circuit opens.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Returns how long the circuit stays open before admitting a probe.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the name of the current state.
    #[must_use]
    pub fn state_name(&self) -> StateName {
        self.state.name()
    }

    /// Returns the failure count, which is `0` outside the closed state.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        match self.state {
            State::Closed { failure_count } => failure_count,
            _ => 0,
        }
    }

    /// Returns when the circuit opened, iff it is currently open.
    #[must_use]
    pub fn opened_at(&self) -> Option<SystemTime> {
        self.state.opened_at()
    }

    pub(crate) fn set_exclude(&mut self, rules: Vec<ExcludeRule>) {
        self.exclude = rules;
    }

    /// Called on scope entry.
    ///
    /// An open circuit refuses entry with [`Error::CircuitOpen`] until `now` passes
    /// `opened_at + ttl`, at which point the circuit moves to half-opened and the entry
    /// is admitted as a probe.
    pub fn enter(&mut self, now: SystemTime) -> Result<()> {
        match self.state {
            State::Closed { .. } | State::HalfOpened => Ok(()),
            State::Opened { opened_at } => match opened_at.checked_add(self.ttl) {
                Some(expires_at) if now > expires_at => {
                    self.set_state(State::HalfOpened);
                    self.enter(now)
                }
                _ => Err(Error::CircuitOpen {
                    name: self.name.clone(),
                }),
            },
        }
    }

    /// Called on scope exit when the guarded operation failed.
    ///
    /// An excluded error is a success as far as the circuit is concerned and is routed to
    /// [`handle_end_request`][Self::handle_end_request]. Anything else is counted, and
    /// reaching the threshold (or failing the half-opened probe) opens the circuit at
    /// `now`.
    pub fn handle_exception(&mut self, err: &(dyn std::error::Error + 'static), now: SystemTime) {
        if exclude::is_excluded(&self.exclude, err) {
            self.handle_end_request();
            return;
        }

        match self.state {
            State::Closed { failure_count } => {
                let failed = failure_count.saturating_add(1);
                self.mark_failure(failed);
                if failed >= self.threshold {
                    self.set_state(State::Opened { opened_at: now });
                }
            }
            State::HalfOpened => self.set_state(State::Opened { opened_at: now }),
            // The circuit refused entry before the call started; a straggling exit from a
            // scope that entered under an earlier state carries no information.
            State::Opened { .. } => {}
        }
    }

    /// Called on scope exit when the guarded operation succeeded.
    pub fn handle_end_request(&mut self) {
        match self.state {
            State::Closed { failure_count: 0 } | State::Opened { .. } => {}
            State::Closed { .. } => self.recover_failure(),
            State::HalfOpened => {
                self.recover_failure();
                self.set_state(State::Closed { failure_count: 0 });
            }
        }
    }

    /// Replaces the state and records the transition in the outbox.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
        let state_name = self.state.name();
        debug!(circuit = %self.name, state = %state_name, "circuit state changed");
        self.outbox.push(Event::ContextChanged {
            name: self.name.clone(),
            state: state_name,
            opened_at: self.state.opened_at(),
        });
    }

    /// Records a counted failure in the outbox and stores the new count.
    pub fn mark_failure(&mut self, failure_count: u32) {
        if let State::Closed { failure_count: count } = &mut self.state {
            *count = failure_count;
        }
        self.outbox.push(Event::CircuitBreakerFailed {
            name: self.name.clone(),
            failure_count,
        });
    }

    /// Records a recovery in the outbox and resets the failure count.
    pub fn recover_failure(&mut self) {
        self.outbox.push(Event::CircuitBreakerRecovered {
            name: self.name.clone(),
        });
        if let State::Closed { failure_count } = &mut self.state {
            *failure_count = 0;
        }
    }

    /// Returns the events pending in the outbox without draining them.
    #[must_use]
    pub fn pending_events(&self) -> &[Event] {
        &self.outbox
    }

    /// Drains the outbox, oldest event first.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }
}

/// Equality covers the persisted identity of a circuit: name, settings, and state.
/// Exclusion rules and pending events are scope-local and do not participate.
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.threshold == other.threshold
            && self.ttl == other.ttl
            && self.state == other.state
    }
}
