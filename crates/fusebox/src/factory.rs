// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tick::Clock;
use tracing::debug;

use crate::bus::{EventHandler, MessageBus, command_handler_fn, event_handler_fn};
use crate::constants::{DEFAULT_THRESHOLD, DEFAULT_TTL, ERR_POISONED_LOCK};
use crate::context::SharedContext;
use crate::errors::{CallError, Error, Result};
use crate::exclude::ExcludeRule;
use crate::handlers;
use crate::listener::CircuitBreakerListener;
use crate::messages::{Command, CommandKind, Event, EventKind};
use crate::repository::Repository;
use crate::unit_of_work::{InMemoryUnitOfWork, UnitOfWork};

type Listeners = Mutex<Vec<Arc<dyn CircuitBreakerListener>>>;

/// Per-call settings for [`CircuitBreakerFactory::get_breaker_with`].
///
/// Threshold and TTL only apply when the circuit does not exist yet; an existing circuit
/// keeps its registered settings. Exclusion rules apply to the returned breaker either
/// way, ahead of the factory's global rules.
#[derive(Debug, Clone, Default)]
pub struct BreakerOptions {
    threshold: Option<u32>,
    ttl: Option<Duration>,
    exclude: Vec<ExcludeRule>,
}

impl BreakerOptions {
    /// Creates options that inherit every factory default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the failure threshold for a circuit created by this call.
    #[must_use]
    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Overrides the open-state duration for a circuit created by this call.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Appends an exclusion rule evaluated before the factory's global rules.
    #[must_use]
    pub fn exclude(mut self, rule: ExcludeRule) -> Self {
        self.exclude.push(rule);
        self
    }

    pub(crate) fn threshold_override(&self) -> Option<u32> {
        self.threshold
    }

    pub(crate) fn ttl_override(&self) -> Option<Duration> {
        self.ttl
    }

    pub(crate) fn into_exclude(self) -> Vec<ExcludeRule> {
        self.exclude
    }
}

/// Builder for [`CircuitBreakerFactory`].
#[derive(Debug)]
pub struct FactoryBuilder {
    clock: Clock,
    default_threshold: u32,
    default_ttl: Duration,
    exclude: Vec<ExcludeRule>,
}

impl FactoryBuilder {
    /// Starts a builder with the default threshold and TTL.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            default_threshold: DEFAULT_THRESHOLD,
            default_ttl: DEFAULT_TTL,
            exclude: Vec::new(),
        }
    }

    /// Sets the failure threshold used for circuits that do not override it.
    #[must_use]
    pub fn default_threshold(mut self, threshold: u32) -> Self {
        self.default_threshold = threshold;
        self
    }

    /// Sets the open-state duration used for circuits that do not override it.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Appends a global exclusion rule, evaluated after any per-breaker rules.
    #[must_use]
    pub fn exclude(mut self, rule: ExcludeRule) -> Self {
        self.exclude.push(rule);
        self
    }

    /// Builds a factory whose circuits live in process memory.
    #[must_use]
    pub fn build(self) -> CircuitBreakerFactory<InMemoryUnitOfWork> {
        self.build_with(InMemoryUnitOfWork::new())
    }

    /// Builds a factory over the given unit of work.
    pub fn build_with<U: UnitOfWork>(self, uow: U) -> CircuitBreakerFactory<U> {
        let listeners: Arc<Listeners> = Arc::new(Mutex::new(Vec::new()));
        let mut bus = MessageBus::new();

        bus.add_command_handler(
            CommandKind::CreateCircuitBreaker,
            command_handler_fn(handlers::register_circuit_breaker::<U>),
        )
        .expect("a fresh bus has no command handlers");

        // Persistence runs before listener notification for every event kind.
        for kind in EventKind::ALL {
            bus.add_event_handler(kind, event_handler_fn(handlers::persist_event::<U>));
            bus.add_event_handler(
                kind,
                Arc::new(NotifyListeners {
                    listeners: Arc::clone(&listeners),
                }),
            );
        }

        CircuitBreakerFactory {
            default_threshold: self.default_threshold,
            default_ttl: self.default_ttl,
            global_exclude: self.exclude,
            clock: self.clock,
            bus,
            uow: tokio::sync::Mutex::new(uow),
            listeners,
        }
    }
}

/// Event handler fanning a persisted event out to the factory's listeners.
struct NotifyListeners {
    listeners: Arc<Listeners>,
}

impl<U> EventHandler<U> for NotifyListeners {
    fn handle<'a>(&'a self, event: &'a Event, _uow: &'a mut U) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // Snapshot under the lock so a listener can add or remove listeners without
            // deadlocking the notification that is currently running.
            let listeners: Vec<_> = self.listeners.lock().expect(ERR_POISONED_LOCK).clone();
            for listener in &listeners {
                listener.on_event(event.circuit_name(), event.kind(), event);
            }
            Ok(())
        })
    }
}

/// Mints named circuit breakers and owns everything they share: the unit of work, the
/// message bus with its internal handlers, default settings, global exclusion rules, and
/// the registered listeners.
///
/// Circuits are created lazily on first request by name. The factory is the only place
/// that touches the repository; breakers reach it exclusively through the events they
/// emit.
pub struct CircuitBreakerFactory<U: UnitOfWork = InMemoryUnitOfWork> {
    default_threshold: u32,
    default_ttl: Duration,
    global_exclude: Vec<ExcludeRule>,
    clock: Clock,
    bus: MessageBus<U>,
    uow: tokio::sync::Mutex<U>,
    listeners: Arc<Listeners>,
}

impl CircuitBreakerFactory<InMemoryUnitOfWork> {
    /// Starts building a factory.
    #[must_use]
    pub fn builder(clock: &Clock) -> FactoryBuilder {
        FactoryBuilder::new(clock)
    }
}

impl<U: UnitOfWork> CircuitBreakerFactory<U> {
    /// Opens the backing repository resource.
    ///
    /// # Errors
    ///
    /// Forwards the repository's initialization error.
    pub async fn initialize(&self) -> Result<()> {
        self.uow.lock().await.contexts().initialize().await
    }

    /// Returns the breaker for `name`, creating the circuit with the factory defaults
    /// when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Forwards repository errors raised while reading or creating the circuit.
    pub async fn get_breaker(&self, name: &str) -> Result<CircuitBreaker<'_, U>> {
        self.get_breaker_with(name, BreakerOptions::new()).await
    }

    /// Returns the breaker for `name` with per-call settings.
    ///
    /// # Errors
    ///
    /// Forwards repository errors raised while reading or creating the circuit.
    pub async fn get_breaker_with(&self, name: &str, options: BreakerOptions) -> Result<CircuitBreaker<'_, U>> {
        let context = {
            let mut uow = self.uow.lock().await;
            match uow.contexts().get(name).await? {
                Some(context) => context,
                None => {
                    debug!(circuit = name, "creating circuit breaker");
                    let command = Command::CreateCircuitBreaker {
                        name: name.to_string(),
                        threshold: options.threshold.unwrap_or(self.default_threshold),
                        ttl: options.ttl.unwrap_or(self.default_ttl),
                    };
                    self.bus.handle(command, &mut uow).await?.ok_or_else(|| {
                        Error::Configuration(format!("creating circuit \"{name}\" returned no context"))
                    })?
                }
            }
        };

        let mut exclude = options.exclude;
        exclude.extend(self.global_exclude.iter().cloned());
        context.lock().expect(ERR_POISONED_LOCK).set_exclude(exclude);

        Ok(CircuitBreaker { factory: self, context })
    }

    /// Registers a listener invoked for every public circuit event.
    pub fn add_listener(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.listeners.lock().expect(ERR_POISONED_LOCK).push(listener);
    }

    /// Removes a previously registered listener, identified by pointer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the listener is not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn CircuitBreakerListener>) -> Result<()> {
        let mut listeners = self.listeners.lock().expect(ERR_POISONED_LOCK);
        if let Some(index) = listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            drop(listeners.remove(index));
            Ok(())
        } else {
            Err(Error::Configuration(
                "listener is not registered on this factory".to_string(),
            ))
        }
    }

    /// Returns the message bus, for registering additional event handlers.
    pub fn bus_mut(&mut self) -> &mut MessageBus<U> {
        &mut self.bus
    }

    /// Returns the clock the factory and its breakers read.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

impl<U: UnitOfWork> fmt::Debug for CircuitBreakerFactory<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerFactory")
            .field("default_threshold", &self.default_threshold)
            .field("default_ttl", &self.default_ttl)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

/// A named circuit breaker, scoped to the factory that minted it.
///
/// The breaker guards one operation at a time: entry consults the state machine
/// (propagating [`Error::CircuitOpen`] when the circuit refuses), exit records the
/// outcome, and the events the state machine emitted are dispatched through the
/// factory's bus before control returns.
///
/// [`call`][Self::call] bundles that protocol around a closure; `enter` /
/// [`record_success`][Self::record_success] / [`record_failure`][Self::record_failure]
/// expose it piecewise for callers that cannot use one.
///
/// If a breaker's future is dropped between entry and exit (cancellation), nothing is
/// recorded; events already in the context outbox are dispatched by the next completed
/// scope on the same circuit.
pub struct CircuitBreaker<'a, U: UnitOfWork> {
    factory: &'a CircuitBreakerFactory<U>,
    context: SharedContext,
}

impl<U: UnitOfWork> CircuitBreaker<'_, U> {
    /// Runs `operation` guarded by the circuit.
    ///
    /// # Errors
    ///
    /// - [`CallError::Circuit`] with [`Error::CircuitOpen`] when the circuit refuses
    ///   entry; the operation is not invoked.
    /// - [`CallError::Circuit`] when dispatching the resulting events fails.
    /// - [`CallError::Service`] carrying the operation's own error, unchanged.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> std::result::Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::error::Error + 'static,
    {
        self.enter().map_err(CallError::Circuit)?;
        let outcome = operation().await;
        match &outcome {
            Ok(_) => self.record_success().await?,
            Err(err) => self.record_failure(err).await?,
        }
        outcome.map_err(CallError::Service)
    }

    /// Consults the state machine on scope entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] while the circuit refuses calls.
    pub fn enter(&self) -> Result<()> {
        let now = self.factory.clock.system_time();
        self.context.lock().expect(ERR_POISONED_LOCK).enter(now)
    }

    /// Records a successful scope exit and dispatches the resulting events.
    ///
    /// # Errors
    ///
    /// Forwards errors raised while persisting the state change.
    pub async fn record_success(&self) -> Result<()> {
        self.context.lock().expect(ERR_POISONED_LOCK).handle_end_request();
        self.drain_outbox().await
    }

    /// Records a failed scope exit and dispatches the resulting events.
    ///
    /// The exclusion rules decide whether the error counts as a failure or as a
    /// success.
    ///
    /// # Errors
    ///
    /// Forwards errors raised while persisting the state change.
    pub async fn record_failure(&self, error: &(dyn std::error::Error + 'static)) -> Result<()> {
        let now = self.factory.clock.system_time();
        self.context
            .lock()
            .expect(ERR_POISONED_LOCK)
            .handle_exception(error, now);
        self.drain_outbox().await
    }

    /// Returns the circuit context shared with the repository.
    #[must_use]
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Returns the name of the guarded circuit.
    #[must_use]
    pub fn name(&self) -> String {
        self.context.lock().expect(ERR_POISONED_LOCK).name().to_string()
    }

    /// Forwards every pending context event through the factory's bus, in emission
    /// order.
    async fn drain_outbox(&self) -> Result<()> {
        let events = self.context.lock().expect(ERR_POISONED_LOCK).take_events();
        if events.is_empty() {
            return Ok(());
        }
        let mut uow = self.factory.uow.lock().await;
        for event in events {
            let _ = self.factory.bus.handle(event, &mut uow).await?;
        }
        Ok(())
    }
}

impl<U: UnitOfWork> fmt::Debug for CircuitBreaker<'_, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
