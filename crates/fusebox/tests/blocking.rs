// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for the blocking surface. The scenarios mirror the async tests;
//! the two surfaces must behave identically modulo where suspension occurs.

use std::time::Duration;

use fusebox::blocking::CircuitBreakerFactory;
use fusebox::{BreakerOptions, CallError, Error, ExcludeRule, StateName};
use tick::ClockControl;

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

#[derive(Debug, thiserror::Error)]
#[error("http {status} error")]
struct HttpError {
    status: u16,
}

#[test]
fn full_cycle_open_probe_recover() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let factory = CircuitBreakerFactory::builder(&clock).build();
    let breaker = factory
        .get_breaker_with("client", BreakerOptions::new().threshold(2).ttl(Duration::from_millis(100)))
        .expect("in-memory creation succeeds");

    for _ in 0..2 {
        let outcome = breaker.call(|| Err::<(), Boom>(Boom));
        assert!(matches!(outcome, Err(CallError::Service(Boom))));
    }

    let err = breaker.call(|| Ok::<_, Boom>(())).expect_err("open circuit refuses");
    assert!(err.is_open());
    match err {
        CallError::Circuit(Error::CircuitOpen { name }) => assert_eq!(name, "client"),
        other => panic!("expected CircuitOpen, got {other:?}"),
    }

    // A failing probe re-opens, a successful one closes.
    control.advance(Duration::from_millis(110));
    let _ = breaker.call(|| Err::<(), Boom>(Boom));
    {
        let context = breaker.context().lock().expect("test lock");
        assert_eq!(context.state_name(), StateName::Opened);
    }

    control.advance(Duration::from_millis(110));
    breaker.call(|| Ok::<_, Boom>(())).expect("probe succeeds");
    let context = breaker.context().lock().expect("test lock");
    assert_eq!(context.state_name(), StateName::Closed);
    assert_eq!(context.failure_count(), 0);
}

#[test]
fn exclusions_compose_like_the_async_surface() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let factory = CircuitBreakerFactory::builder(&clock)
        .exclude(ExcludeRule::of::<Boom>())
        .build();
    let breaker = factory
        .get_breaker_with(
            "client",
            BreakerOptions::new()
                .threshold(1)
                .exclude(ExcludeRule::when(|e: &HttpError| e.status < 500)),
        )
        .expect("in-memory creation succeeds");

    let _ = breaker.call(|| Err::<(), Boom>(Boom));
    let _ = breaker.call(|| Err::<(), HttpError>(HttpError { status: 404 }));
    {
        let context = breaker.context().lock().expect("test lock");
        assert_eq!(context.state_name(), StateName::Closed);
        assert_eq!(context.failure_count(), 0);
    }

    let _ = breaker.call(|| Err::<(), HttpError>(HttpError { status: 503 }));
    let context = breaker.context().lock().expect("test lock");
    assert_eq!(context.state_name(), StateName::Opened);
}

#[test]
fn scoped_protocol_records_outcomes() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let factory = CircuitBreakerFactory::builder(&clock).default_threshold(3).build();
    let breaker = factory.get_breaker("client").expect("in-memory creation succeeds");

    breaker.enter().expect("closed circuit admits entry");
    breaker.record_failure(&Boom).expect("recording persists in memory");
    breaker.enter().expect("closed circuit admits entry");
    breaker.record_success().expect("recording persists in memory");

    let context = breaker.context().lock().expect("test lock");
    assert_eq!(context.failure_count(), 0);
}
