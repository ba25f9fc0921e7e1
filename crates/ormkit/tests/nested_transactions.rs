//! Server-profile transaction scoping: nested `New` scopes roll back
//! independently via savepoints, and outer rollback reverts the entity
//! graph in memory.

mod support;

use ormkit::prelude::*;
use support::{MemoryDriver, hero_key, hero_tuple};

#[test]
fn nested_scope_rollback_keeps_the_outer_value() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);

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
        .set_field(&hero_key(1), 0, Value::Text("inner".into()))
        .unwrap();

    session.close(&inner).unwrap();
    assert_eq!(
        session.get_field(&hero_key(1), 0).unwrap(),
        Value::Text("outer".to_string())
    );

    outer.complete();
    session.close(&outer).unwrap();

    // The committed row carries the outer-scope value.
    let store = state.lock().expect("lock poisoned");
    let (data, _) = store.lookup(&hero_key(1)).expect("committed row");
    assert_eq!(data.get(0).unwrap(), &Value::Text("outer".to_string()));
}

#[test]
fn outer_rollback_reverts_the_entity_graph_in_memory() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);

    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session.save_changes().unwrap();

    let scope = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .set_field(&hero_key(1), 0, Value::Text("peter".into()))
        .unwrap();
    session
        .create_entity(hero_key(2), hero_tuple("tony", 40))
        .unwrap();
    session.remove_entity(&hero_key(1)).unwrap();

    // Dispose without completing.
    session.close(&scope).unwrap();

    assert_eq!(
        session.persistence_state(&hero_key(1)).unwrap(),
        PersistenceState::Synchronized
    );
    assert_eq!(
        session.get_field(&hero_key(1), 0).unwrap(),
        Value::Text("spider".to_string())
    );
    assert_eq!(
        session.persistence_state(&hero_key(2)).unwrap(),
        PersistenceState::Removed
    );
    assert_eq!(session.registry().count(), 0);
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 1);
}

#[test]
fn completion_propagates_only_when_every_scope_completes() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);

    let mut outer = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();

    // Joined scope disposed without completing poisons the frame.
    let joined = session.open_transaction(TransactionMode::Default).unwrap();
    session.close(&joined).unwrap();

    outer.complete();
    session.close(&outer).unwrap();

    assert!(!session.is_in_transaction());
    assert_eq!(state.lock().expect("lock poisoned").committed_len(), 0);
}

#[test]
fn out_of_order_close_is_a_scope_error() {
    let (driver, _) = MemoryDriver::new();
    let mut session = Session::new(driver);

    let outer = session.open_transaction(TransactionMode::Default).unwrap();
    let _inner = session.open_transaction(TransactionMode::New).unwrap();
    assert_eq!(session.transaction_depth(), 2);

    let err = session.close(&outer).unwrap_err();
    let Error::Session(session_err) = &err else {
        panic!("expected session error, got {err}");
    };
    assert_eq!(session_err.kind, ormkit::SessionErrorKind::ScopeOrder);
    assert_eq!(session.transaction_depth(), 2);
}

#[test]
fn commit_makes_the_transaction_changes_durable() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);

    let mut scope = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();
    session
        .create_entity(hero_key(2), hero_tuple("tony", 40))
        .unwrap();
    scope.complete();
    session.close(&scope).unwrap();

    let store = state.lock().expect("lock poisoned");
    assert_eq!(store.committed_len(), 2);
    for id in [1, 2] {
        assert_eq!(
            session.persistence_state(&hero_key(id)).unwrap(),
            PersistenceState::Synchronized
        );
    }
}

#[test]
fn server_profile_queries_observe_pending_changes() {
    let (driver, state) = MemoryDriver::new();
    let mut session = Session::new(driver);

    let _scope = session.open_transaction(TransactionMode::Default).unwrap();
    session
        .create_entity(hero_key(1), hero_tuple("spider", 25))
        .unwrap();

    // The pending insert is flushed before the query runs, so the query
    // sees it inside the same transaction.
    let rows = session.query(&ormkit::QueryRequest::new("select Hero")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0).unwrap(), &Value::Text("spider".to_string()));

    // Still uncommitted; the statement reached the driver once.
    let store = state.lock().expect("lock poisoned");
    assert_eq!(store.committed_len(), 0);
    assert_eq!(store.queries, vec!["select Hero".to_string()]);
}
