// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Repository-level tests against the in-memory store fake.

mod common;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::MemoryStore;
use fusebox::{Context, Error, Repository, State, StateName};
use fusebox_redis::RemoteRepository;

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn shared(context: Context) -> fusebox::SharedContext {
    Arc::new(std::sync::Mutex::new(context))
}

async fn initialized_repository() -> (RemoteRepository<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let mut repository = RemoteRepository::new(store.clone());
    repository.initialize().await.expect("fake store initializes");
    (repository, store)
}

#[tokio::test]
async fn operations_require_initialization() {
    let mut repository = RemoteRepository::new(MemoryStore::new());
    let err = repository.get("foo").await.expect_err("store is not initialized");
    assert!(matches!(err, Error::Store(_)));
}

#[tokio::test]
async fn get_unknown_circuit_returns_none() {
    let (mut repository, _store) = initialized_repository().await;
    assert!(repository.get("nope").await.expect("get succeeds").is_none());
}

#[tokio::test]
async fn registered_state_survives_a_round_trip() {
    for state in [
        State::Closed { failure_count: 0 },
        State::Opened { opened_at: at(1_700_000_000) },
        State::HalfOpened,
    ] {
        let (mut repository, _store) = initialized_repository().await;
        let context = Context::restore("foo", 40, Duration::from_secs(10), state);
        repository.register(shared(context)).await.expect("register succeeds");

        let loaded = repository
            .get("foo")
            .await
            .expect("get succeeds")
            .expect("context was registered");
        let loaded = loaded.lock().expect("test lock");
        assert_eq!(*loaded, Context::restore("foo", 40, Duration::from_secs(10), state));
    }
}

#[tokio::test]
async fn workflow_increments_updates_and_resets() {
    let (mut repository, store) = initialized_repository().await;
    repository
        .register(shared(Context::new("foo", 40, Duration::from_secs(10))))
        .await
        .expect("register succeeds");

    // The advisory count is ignored; the store counts by itself.
    repository.inc_failures("foo", 1).await.expect("incr succeeds");
    repository.inc_failures("foo", 99).await.expect("incr succeeds");

    let loaded = repository.get("foo").await.expect("get succeeds").expect("registered");
    assert_eq!(loaded.lock().expect("test lock").failure_count(), 2);

    let opened_at = at(1_700_000_000);
    repository
        .update_state("foo", StateName::Opened, Some(opened_at))
        .await
        .expect("update succeeds");
    let loaded = repository.get("foo").await.expect("get succeeds").expect("registered");
    assert_eq!(loaded.lock().expect("test lock").opened_at(), Some(opened_at));
    // The counter key is untouched by state updates.
    assert_eq!(store.contents()["cbr::foo::failure_count"], "2");

    repository
        .update_state("foo", StateName::HalfOpened, None)
        .await
        .expect("update succeeds");
    let loaded = repository.get("foo").await.expect("get succeeds").expect("registered");
    assert_eq!(loaded.lock().expect("test lock").opened_at(), None);

    repository.reset_failure("foo").await.expect("reset succeeds");
    repository
        .update_state("foo", StateName::Closed, None)
        .await
        .expect("update succeeds");
    let loaded = repository.get("foo").await.expect("get succeeds").expect("registered");
    let loaded = loaded.lock().expect("test lock");
    assert_eq!(loaded.state_name(), StateName::Closed);
    assert_eq!(loaded.failure_count(), 0);
}

#[tokio::test]
async fn register_is_idempotent() {
    let (mut repository, store) = initialized_repository().await;
    let context = Context::new("foo", 40, Duration::from_secs(10));
    repository.register(shared(context)).await.expect("register succeeds");
    repository.inc_failures("foo", 1).await.expect("incr succeeds");

    // Re-registering an equal context alters neither the state nor the counter.
    repository
        .register(shared(Context::new("foo", 40, Duration::from_secs(10))))
        .await
        .expect("register succeeds");
    let loaded = repository.get("foo").await.expect("get succeeds").expect("registered");
    assert_eq!(loaded.lock().expect("test lock").failure_count(), 1);
    assert_eq!(store.contents()["cbr::foo::failure_count"], "1");
}

#[tokio::test]
async fn reset_on_a_zero_counter_stays_zero() {
    let (mut repository, store) = initialized_repository().await;
    repository
        .register(shared(Context::new("foo", 40, Duration::from_secs(10))))
        .await
        .expect("register succeeds");

    repository.reset_failure("foo").await.expect("reset succeeds");
    repository.reset_failure("foo").await.expect("reset succeeds");
    assert_eq!(store.contents()["cbr::foo::failure_count"], "0");
}

#[tokio::test]
async fn update_state_for_unknown_circuit_is_a_no_op() {
    let (mut repository, store) = initialized_repository().await;
    repository
        .update_state("ghost", StateName::Opened, Some(at(100)))
        .await
        .expect("missing documents are skipped");
    assert!(!store.contents().contains_key("cbr::ghost"));
}
