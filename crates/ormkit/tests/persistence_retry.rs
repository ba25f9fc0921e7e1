//! Flush failure semantics: constraint violations repeat verbatim across
//! retries with the registry preserved, and optimistic-concurrency
//! conflicts fail the whole flush with nothing partially persisted.

mod support;

use asupersync::runtime::RuntimeBuilder;
use ormkit::prelude::*;
use support::{MemoryDriver, hero_key, hero_tuple};

#[test]
fn constraint_violation_repeats_until_corrected() {
    let (driver, state) = MemoryDriver::new();
    state.lock().expect("lock poisoned").unique = Some((0, "uq_hero_name"));
    let mut session = Session::new(driver);

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    // Same unique value again.
    session
        .create_entity(hero_key(2), hero_tuple("spider", 40))
        .unwrap();

    let first = session.save_changes().unwrap_err();
    assert!(first.is_constraint_violation());
    let second = session.save_changes().unwrap_err();
    assert_eq!(first.to_string(), second.to_string());

    // The registry still holds the pending insert; nothing was rolled back.
    assert_eq!(session.registry().count(), 1);
    assert_eq!(
        session.persistence_state(&hero_key(2)).unwrap(),
        PersistenceState::New
    );
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 1);

    // Correcting the offending entity makes the same unit of work flush.
    session
        .set_field(&hero_key(2), 0, Value::Text("tony".into()))
        .unwrap();
    session.save_changes().unwrap();
    assert_eq!(session.registry().count(), 0);
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 2);
}

#[test]
fn retracting_the_offender_also_unblocks_the_flush() {
    let (driver, state) = MemoryDriver::new();
    state.lock().expect("lock poisoned").unique = Some((0, "uq_hero_name"));
    let mut session = Session::new(driver);

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    session
        .create_entity(hero_key(2), hero_tuple("spider", 40))
        .unwrap();
    session
        .create_entity(hero_key(3), hero_tuple("strange", 45))
        .unwrap();
    assert!(session.save_changes().unwrap_err().is_constraint_violation());

    // Atomic failure: the non-offending insert did not land either.
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 1);
    assert_eq!(session.registry().count(), 2);

    session.remove_entity(&hero_key(2)).unwrap();
    session.save_changes().unwrap();
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 2);
}

#[test]
fn stale_version_fails_the_losing_session_entirely() {
    let (driver_a, state) = MemoryDriver::new();
    let mut writer = Session::new(driver_a);

    writer
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    writer.save_changes().unwrap();
    drop(writer);

    // Two sessions load the committed row at version 1.
    let mut first = Session::new(MemoryDriver::sharing(std::sync::Arc::clone(&state)));
    let mut second = Session::new(MemoryDriver::sharing(std::sync::Arc::clone(&state)));
    for session in [&mut first, &mut second] {
        session
            .load_entity(hero_key(1), hero_tuple("spider", 25))
            .unwrap();
        session
            .set_entity_version(&hero_key(1), Some(Value::BigInt(1)))
            .unwrap();
    }

    first
        .set_field(&hero_key(1), 1, Value::BigInt(26))
        .unwrap();
    first.save_changes().unwrap();

    // The losing flush fails whole: the stale update and the unrelated
    // insert both stay pending.
    second
        .set_field(&hero_key(1), 1, Value::BigInt(99))
        .unwrap();
    second
        .create_entity(hero_key(2), hero_tuple("tony", 40))
        .unwrap();
    let err = second.save_changes().unwrap_err();
    assert!(err.is_stale_version(), "unexpected error: {err}");
    assert_eq!(second.registry().count(), 2);
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 1);

    // Refreshing the version token lets the retry succeed.
    second
        .set_entity_version(&hero_key(1), Some(Value::BigInt(2)))
        .unwrap();
    second.save_changes().unwrap();
    assert_eq!(second.registry().count(), 0);

    let store = state.lock().expect("lock poisoned");
    let (data, version) = store.lookup(&hero_key(1)).expect("committed row");
    assert_eq!(data.get(1).unwrap(), &Value::BigInt(99));
    assert_eq!(version.as_ref(), Some(&Value::BigInt(3)));
}

#[test]
fn async_persist_flushes_the_registry() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);
    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();

    rt.block_on(async {
        match session.save_changes_async(&cx).await {
            Outcome::Ok(()) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    assert_eq!(session.registry().count(), 0);
    assert_eq!(
        session.persistence_state(&hero_key(1)).unwrap(),
        PersistenceState::Synchronized
    );
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 1);
}

#[test]
fn async_persist_surfaces_driver_errors_without_clearing_buckets() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    let (driver, state) = MemoryDriver::new();
    state.lock().expect("lock poisoned").unique = Some((0, "uq_hero_name"));
    let mut session = Session::new(driver);

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();
    session
        .create_entity(hero_key(2), hero_tuple("spider", 30))
        .unwrap();

    rt.block_on(async {
        match session.save_changes_async(&cx).await {
            Outcome::Err(e) => assert!(e.is_constraint_violation()),
            other => panic!("expected constraint violation, got {other:?}"),
        }
    });

    assert_eq!(session.registry().count(), 1);
}
