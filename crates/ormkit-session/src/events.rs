//! Session event hooks.
//!
//! The session exposes named hooks at well-defined lifecycle points.
//! Lifecycle hooks take no arguments and may abort the surrounding
//! operation by returning `Err`; entity hooks receive the entity key and
//! field hooks additionally receive the field index.
//!
//! Ordering contract enforced by the session:
//!
//! - `Persisting`/`Persisted` bracket exactly one flush of the change
//!   registry to the driver.
//! - `QueryExecuting`/`QueryExecuted` bracket exactly one ad hoc query and
//!   never fire for prepared execution; only the command-level pair fires
//!   there.

use ormkit_core::{EntityKey, Result};
use std::collections::HashMap;

/// Type alias for lifecycle event callbacks.
///
/// Returning `Err` aborts the operation (e.g. prevents commit).
type LifecycleHook = Box<dyn FnMut() -> Result<()> + Send>;

/// Type alias for entity event callbacks.
type EntityHook = Box<dyn FnMut(&EntityKey) -> Result<()> + Send>;

/// Type alias for field event callbacks.
type FieldHook = Box<dyn FnMut(&EntityKey, usize) -> Result<()> + Send>;

/// Session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// A storage transaction (or nested scope) is about to open.
    TransactionOpening,
    /// The outermost scope completed; validation and flush follow.
    TransactionPrecommitting,
    /// The storage commit is about to execute.
    TransactionCommitting,
    /// The storage commit finished.
    TransactionCommitted,
    /// A rollback is about to execute.
    TransactionRollbacking,
    /// A rollback finished.
    TransactionRollbacked,
    /// A flush of the change registry is about to execute.
    Persisting,
    /// A flush finished.
    Persisted,
    /// Buffered changes are about to be discarded.
    ChangesCanceling,
    /// Buffered changes were discarded.
    ChangesCanceled,
    /// An ad hoc query is about to execute.
    QueryExecuting,
    /// An ad hoc query finished.
    QueryExecuted,
    /// A low-level command is about to execute.
    CommandExecuting,
    /// A low-level command finished.
    CommandExecuted,
}

/// Entity lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// An entity was created in the session.
    Created,
    /// An entity is about to be removed; hooks may abort.
    Removing,
    /// An entity was removed.
    Removed,
}

/// Field access events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldEvent {
    /// A field read is about to execute.
    Getting,
    /// A field read finished.
    Get,
    /// A field write is about to execute; hooks may abort.
    Setting,
    /// A field write finished.
    Set,
}

/// Holds registered session event callbacks.
#[derive(Default)]
pub struct SessionEventCallbacks {
    lifecycle: HashMap<SessionEvent, Vec<LifecycleHook>>,
    entity: HashMap<EntityEvent, Vec<EntityHook>>,
    field: HashMap<FieldEvent, Vec<FieldHook>>,
}

impl std::fmt::Debug for SessionEventCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventCallbacks")
            .field(
                "lifecycle",
                &self.lifecycle.values().map(Vec::len).sum::<usize>(),
            )
            .field("entity", &self.entity.values().map(Vec::len).sum::<usize>())
            .field("field", &self.field.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl SessionEventCallbacks {
    /// Register a lifecycle hook.
    pub fn on(&mut self, event: SessionEvent, hook: impl FnMut() -> Result<()> + Send + 'static) {
        self.lifecycle.entry(event).or_default().push(Box::new(hook));
    }

    /// Register an entity hook.
    pub fn on_entity(
        &mut self,
        event: EntityEvent,
        hook: impl FnMut(&EntityKey) -> Result<()> + Send + 'static,
    ) {
        self.entity.entry(event).or_default().push(Box::new(hook));
    }

    /// Register a field hook.
    pub fn on_field(
        &mut self,
        event: FieldEvent,
        hook: impl FnMut(&EntityKey, usize) -> Result<()> + Send + 'static,
    ) {
        self.field.entry(event).or_default().push(Box::new(hook));
    }

    /// Fire a lifecycle event, stopping at the first `Err`.
    ///
    /// Hook errors propagate unmodified to the caller.
    pub fn fire(&mut self, event: SessionEvent) -> Result<()> {
        if let Some(hooks) = self.lifecycle.get_mut(&event) {
            for hook in hooks.iter_mut() {
                hook()?;
            }
        }
        Ok(())
    }

    /// Fire an entity event.
    pub fn fire_entity(&mut self, event: EntityEvent, key: &EntityKey) -> Result<()> {
        if let Some(hooks) = self.entity.get_mut(&event) {
            for hook in hooks.iter_mut() {
                hook(key)?;
            }
        }
        Ok(())
    }

    /// Fire a field event.
    pub fn fire_field(&mut self, event: FieldEvent, key: &EntityKey, index: usize) -> Result<()> {
        if let Some(hooks) = self.field.get_mut(&event) {
            for hook in hooks.iter_mut() {
                hook(key, index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_core::{Error, SessionErrorKind};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hooks_fire_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = SessionEventCallbacks::default();

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            callbacks.on(SessionEvent::Persisting, move || {
                log.lock().expect("lock poisoned").push(tag);
                Ok(())
            });
        }

        callbacks.fire(SessionEvent::Persisting).unwrap();
        assert_eq!(*log.lock().expect("lock poisoned"), vec!["first", "second"]);
    }

    #[test]
    fn test_hook_error_aborts_remaining() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = SessionEventCallbacks::default();

        callbacks.on(SessionEvent::TransactionPrecommitting, || {
            Err(Error::session(SessionErrorKind::HookAborted, "vetoed"))
        });
        {
            let log = Arc::clone(&log);
            callbacks.on(SessionEvent::TransactionPrecommitting, move || {
                log.lock().expect("lock poisoned").push("ran");
                Ok(())
            });
        }

        let err = callbacks
            .fire(SessionEvent::TransactionPrecommitting)
            .unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        assert!(log.lock().expect("lock poisoned").is_empty());
    }

    #[test]
    fn test_field_hooks_receive_key_and_index() {
        let seen = Arc::new(Mutex::new(None));
        let mut callbacks = SessionEventCallbacks::default();

        {
            let seen = Arc::clone(&seen);
            callbacks.on_field(FieldEvent::Setting, move |key, index| {
                *seen.lock().expect("lock poisoned") = Some((key.clone(), index));
                Ok(())
            });
        }

        let key = EntityKey::from_id("Hero", 7);
        callbacks.fire_field(FieldEvent::Setting, &key, 2).unwrap();

        let stored = seen.lock().expect("lock poisoned");
        let (stored_key, stored_index) = stored.as_ref().expect("hook fired");
        assert_eq!(stored_key, &key);
        assert_eq!(*stored_index, 2);
    }

    #[test]
    fn test_unregistered_event_is_noop() {
        let mut callbacks = SessionEventCallbacks::default();
        assert!(callbacks.fire(SessionEvent::CommandExecuted).is_ok());
        assert!(
            callbacks
                .fire_entity(EntityEvent::Created, &EntityKey::from_id("Hero", 1))
                .is_ok()
        );
    }
}
