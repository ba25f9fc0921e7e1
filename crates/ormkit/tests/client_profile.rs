//! Client-profile sessions buffer mutations in memory until an explicit
//! persist; cancel discards the buffer back to the last persisted baseline.

mod support;

use ormkit::prelude::*;
use support::{MemoryDriver, hero_key, hero_tuple};

#[test]
fn cancel_turns_never_persisted_entities_into_dead_stubs() {
    let (driver, _) = MemoryDriver::new();
    let mut session = Session::with_config(driver, SessionConfig::client());

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session
        .create_entity(hero_key(2), hero_tuple("tony", 40))
        .unwrap();

    session.cancel_changes().unwrap();

    for id in [1, 2] {
        assert_eq!(
            session.persistence_state(&hero_key(id)).unwrap(),
            PersistenceState::Removed
        );
        let err = session
            .set_field(&hero_key(id), 0, Value::Text("renamed".into()))
            .unwrap_err();
        assert!(err.is_entity_removed(), "unexpected error: {err}");
    }
}

#[test]
fn cancel_restores_the_last_persisted_baseline() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::with_config(driver, SessionConfig::client());

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    // Buffered mutation on top of the persisted image.
    session
        .set_field(&hero_key(1), 0, Value::Text("peter".into()))
        .unwrap();
    assert_eq!(session.registry().count(), 1);

    session.cancel_changes().unwrap();

    assert_eq!(
        session.persistence_state(&hero_key(1)).unwrap(),
        PersistenceState::Synchronized
    );
    assert_eq!(
        session.get_field(&hero_key(1), 0).unwrap(),
        Value::Text("spider".to_string())
    );
    // The store never saw the buffered mutation.
    let store = state.lock().expect("lock poisoned");
    let (data, _) = store.lookup(&hero_key(1)).expect("persisted row");
    assert_eq!(data.get(0).unwrap(), &Value::Text("spider".to_string()));
}

#[test]
fn queries_do_not_flush_the_buffer() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::with_config(driver, SessionConfig::client());

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    let rows = session.query(&ormkit::QueryRequest::new("select Hero")).unwrap();

    assert!(rows.is_empty());
    assert_eq!(state.lock().expect("lock poisoned").batches, 0);
    assert_eq!(session.registry().count(), 1);
}

#[test]
fn unconfirmed_nested_scope_rolls_back_to_its_own_entry() {
    let (driver, _) = MemoryDriver::new();
    let mut session = Session::with_config(driver, SessionConfig::client());

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    let mut outer = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .set_field(&hero_key(1), 0, Value::Text("outer".into()))
        .unwrap();

    let inner = session.open_transaction(TransactionMode::New).unwrap();
    session
        .create_entity(hero_key(2), hero_tuple("inner", 1))
        .unwrap();
    session
        .set_field(&hero_key(1), 1, Value::BigInt(30))
        .unwrap();

    // Opened but not confirmed: back to the inner scope's entry, not to
    // the outermost state.
    session.close(&inner).unwrap();

    assert_eq!(
        session.get_field(&hero_key(1), 0).unwrap(),
        Value::Text("outer".to_string())
    );
    assert_eq!(
        session.get_field(&hero_key(1), 1).unwrap(),
        Value::BigInt(25)
    );
    assert_eq!(
        session.persistence_state(&hero_key(2)).unwrap(),
        PersistenceState::Removed
    );

    outer.complete();
    session.close(&outer).unwrap();
    assert_eq!(
        session.get_field(&hero_key(1), 0).unwrap(),
        Value::Text("outer".to_string())
    );
}

#[test]
fn cancel_inside_a_transaction_rolls_the_frame_back() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::with_config(driver, SessionConfig::client());

    let _scope = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    session.cancel_changes().unwrap();

    assert!(!session.is_in_transaction());
    // The flushed insert was staged in the transaction and discarded.
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 0);
}
