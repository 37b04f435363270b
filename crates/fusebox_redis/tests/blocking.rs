// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Blocking-surface tests against the store fake; mirrors the async store tests.

mod common;

use std::time::Duration;

use common::{Boom, MemoryStore};
use fusebox::blocking::CircuitBreakerFactory;
use fusebox::{BreakerOptions, StateName};
use fusebox_redis::blocking::RemoteUnitOfWork;
use tick::ClockControl;

#[test]
fn failures_and_recovery_reach_the_store() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let store = MemoryStore::new();
    let factory = CircuitBreakerFactory::builder(&clock).build_with(RemoteUnitOfWork::new(store.clone()));
    factory.initialize().expect("fake store initializes");

    let breaker = factory
        .get_breaker_with("client", BreakerOptions::new().threshold(2).ttl(Duration::from_millis(100)))
        .expect("creation succeeds");

    let _ = breaker.call(|| Err::<(), Boom>(Boom));
    assert_eq!(store.contents()["cbr::client::failure_count"], "1");

    let _ = breaker.call(|| Err::<(), Boom>(Boom));
    let document: serde_json::Value =
        serde_json::from_str(&store.contents()["cbr::client"]).expect("document is valid JSON");
    assert_eq!(document["state"], "opened");

    control.advance(Duration::from_millis(110));
    breaker.call(|| Ok::<_, Boom>(())).expect("probe succeeds");

    let contents = store.contents();
    let document: serde_json::Value =
        serde_json::from_str(&contents["cbr::client"]).expect("document is valid JSON");
    assert_eq!(document["state"], "closed");
    assert_eq!(contents["cbr::client::failure_count"], "0");
}

#[test]
fn an_open_circuit_is_visible_to_other_clients() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let store = MemoryStore::new();

    let writer = CircuitBreakerFactory::builder(&clock).build_with(RemoteUnitOfWork::new(store.clone()));
    writer.initialize().expect("fake store initializes");
    let breaker = writer
        .get_breaker_with("client", BreakerOptions::new().threshold(1).ttl(Duration::from_secs(30)))
        .expect("creation succeeds");
    let _ = breaker.call(|| Err::<(), Boom>(Boom));

    let reader = CircuitBreakerFactory::builder(&clock).build_with(RemoteUnitOfWork::new(store.clone()));
    reader.initialize().expect("fake store initializes");
    let remote_view = reader.get_breaker("client").expect("read succeeds");
    {
        let context = remote_view.context().lock().expect("test lock");
        assert_eq!(context.state_name(), StateName::Opened);
    }
    let err = remote_view.call(|| Ok::<_, Boom>(())).expect_err("open circuit refuses entry");
    assert!(err.is_open());
}
