// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for factory listeners: registration, removal, and the exact event
//! sequences a circuit publishes over its lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fusebox::{
    CircuitBreakerFactory, CircuitBreakerListener, Error, Event, EventKind, StateName,
};
use tick::ClockControl;

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

type Log = Arc<Mutex<Vec<(String, String, Event)>>>;

fn hook(log: &Log) -> Arc<dyn CircuitBreakerListener> {
    let log = Arc::clone(log);
    Arc::new(move |circuit: &str, kind: EventKind, event: &Event| {
        log.lock()
            .expect("test lock")
            .push((circuit.to_string(), kind.as_str().to_string(), event.clone()));
    })
}

fn drain(log: &Log) -> Vec<(String, String, Event)> {
    std::mem::take(&mut *log.lock().expect("test lock"))
}

#[tokio::test]
async fn listeners_see_the_full_circuit_lifecycle() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let factory = CircuitBreakerFactory::builder(&clock)
        .default_threshold(2)
        .default_ttl(Duration::from_millis(100))
        .build();

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    factory.add_listener(hook(&log));

    let breaker = factory.get_breaker("my").await.expect("in-memory creation succeeds");
    let other = factory.get_breaker("my2").await.expect("in-memory creation succeeds");

    assert_eq!(
        drain(&log),
        vec![
            (
                "my".to_string(),
                "circuit_breaker_created".to_string(),
                Event::CircuitBreakerCreated {
                    name: "my".to_string(),
                    threshold: 2,
                    ttl: Duration::from_millis(100),
                },
            ),
            (
                "my2".to_string(),
                "circuit_breaker_created".to_string(),
                Event::CircuitBreakerCreated {
                    name: "my2".to_string(),
                    threshold: 2,
                    ttl: Duration::from_millis(100),
                },
            ),
        ],
    );

    // Two failures open the circuit; the healthy circuit stays quiet.
    let _ = breaker.call(|| async { Err::<(), Boom>(Boom) }).await;
    other.call(|| async { Ok::<_, Boom>(()) }).await.expect("healthy circuit");
    let _ = breaker.call(|| async { Err::<(), Boom>(Boom) }).await;

    let opened_at = breaker.context().lock().expect("test lock").opened_at();
    assert_eq!(
        drain(&log),
        vec![
            (
                "my".to_string(),
                "failed".to_string(),
                Event::CircuitBreakerFailed {
                    name: "my".to_string(),
                    failure_count: 1,
                },
            ),
            (
                "my".to_string(),
                "failed".to_string(),
                Event::CircuitBreakerFailed {
                    name: "my".to_string(),
                    failure_count: 2,
                },
            ),
            (
                "my".to_string(),
                "state_changed".to_string(),
                Event::ContextChanged {
                    name: "my".to_string(),
                    state: StateName::Opened,
                    opened_at,
                },
            ),
        ],
    );

    // Past the TTL, a failing probe re-opens the circuit.
    control.advance(Duration::from_millis(110));
    let _ = breaker.call(|| async { Err::<(), Boom>(Boom) }).await;

    let reopened_at = breaker.context().lock().expect("test lock").opened_at();
    assert_eq!(
        drain(&log),
        vec![
            (
                "my".to_string(),
                "state_changed".to_string(),
                Event::ContextChanged {
                    name: "my".to_string(),
                    state: StateName::HalfOpened,
                    opened_at: None,
                },
            ),
            (
                "my".to_string(),
                "state_changed".to_string(),
                Event::ContextChanged {
                    name: "my".to_string(),
                    state: StateName::Opened,
                    opened_at: reopened_at,
                },
            ),
        ],
    );

    // Past the TTL again, a successful probe closes it.
    control.advance(Duration::from_millis(110));
    breaker.call(|| async { Ok::<_, Boom>(()) }).await.expect("probe succeeds");

    assert_eq!(
        drain(&log),
        vec![
            (
                "my".to_string(),
                "state_changed".to_string(),
                Event::ContextChanged {
                    name: "my".to_string(),
                    state: StateName::HalfOpened,
                    opened_at: None,
                },
            ),
            (
                "my".to_string(),
                "recovered".to_string(),
                Event::CircuitBreakerRecovered { name: "my".to_string() },
            ),
            (
                "my".to_string(),
                "state_changed".to_string(),
                Event::ContextChanged {
                    name: "my".to_string(),
                    state: StateName::Closed,
                    opened_at: None,
                },
            ),
        ],
    );
}

#[tokio::test]
async fn removed_listeners_stop_receiving_events() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let factory = CircuitBreakerFactory::builder(&clock).default_threshold(2).build();

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let first = hook(&log);
    let second = hook(&log);

    let err = factory.remove_listener(&first).expect_err("not registered yet");
    assert!(matches!(err, Error::Configuration(_)));

    factory.add_listener(Arc::clone(&first));
    let _ = factory.get_breaker("my").await.expect("in-memory creation succeeds");
    assert_eq!(drain(&log).len(), 1);

    factory.add_listener(Arc::clone(&second));
    factory.remove_listener(&first).expect("first is registered");
    factory.remove_listener(&second).expect("second is registered");

    let _ = factory.get_breaker("my2").await.expect("in-memory creation succeeds");
    assert!(drain(&log).is_empty());
}
