//! Session: the unit-of-work boundary.
//!
//! A `Session` owns one change registry, one identity map of synchronized
//! entities, and one transaction scope stack over a [`StorageDriver`]. All
//! entity access goes through the session so it can fire event hooks,
//! enforce immediate constraints, and append undo records while a
//! transaction is open.
//!
//! # Profiles
//!
//! - **Server**: pending changes are persisted automatically before any
//!   ad hoc query, so every mutation is visible to queries within the same
//!   transaction; rolling the outer transaction back reverts the entity
//!   graph in memory.
//! - **Client**: mutations accumulate in memory and reach storage only on
//!   an explicit persist; `cancel_changes` discards the buffer and turns
//!   never-persisted entities into dead stubs.

use crate::events::{EntityEvent, FieldEvent, SessionEvent, SessionEventCallbacks};
use crate::registry::{EntityChangeRegistry, RegisterOutcome};
use crate::scope::{ScopeEntry, TransactionMode, TransactionScope, UndoRecord};
use crate::state::{EntityState, PersistenceState};
use asupersync::{Cx, Outcome};
use ormkit_core::{
    ConstraintMode, DataTuple, EntityKey, Error, FieldConstraint, FieldFailure, PersistBatch,
    PersistOp, PreparedCommand, QueryRequest, Result, SessionErrorKind, StorageDriver,
    ValidationError, Value,
};
use std::collections::{HashMap, HashSet};

/// Persistence profile of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionProfile {
    /// Auto-persist pending changes before queries; immediate visibility.
    #[default]
    Server,
    /// Buffer mutations in memory until an explicit persist.
    Client,
}

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Persistence profile.
    pub profile: SessionProfile,
    /// Session label used in diagnostics.
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: SessionProfile::Server,
            name: "default".to_string(),
        }
    }
}

impl SessionConfig {
    /// Configuration for a client-profile session.
    pub fn client() -> Self {
        Self {
            profile: SessionProfile::Client,
            name: "client".to_string(),
        }
    }
}

/// The session is the central unit-of-work manager.
///
/// It tracks entities created, loaded, modified, and removed within one
/// logical unit of work and coordinates flushing changes to the driver.
/// Sessions are confined to single-threaded use; run one session per
/// logical unit of work.
pub struct Session<D: StorageDriver> {
    /// The storage driver.
    driver: D,
    /// Configuration.
    config: SessionConfig,
    /// Change registry for this unit of work.
    registry: EntityChangeRegistry,
    /// Synchronized entities and dead stubs, by key.
    identity: HashMap<EntityKey, EntityState>,
    /// Keys of dead stubs (cancelled or retracted entities).
    dead: HashSet<EntityKey>,
    /// Open transaction scope stack (LIFO).
    scopes: Vec<ScopeEntry>,
    /// Undo log for in-memory revert; grows only while a transaction is open.
    undo: Vec<UndoRecord>,
    /// Registered event callbacks.
    events: SessionEventCallbacks,
    /// Field constraints by entity type name.
    constraints: HashMap<&'static str, Vec<FieldConstraint>>,
    /// Next scope token id.
    next_scope_id: u64,
}

impl<D: StorageDriver> Session<D> {
    /// Create a session with the default (server-profile) configuration.
    pub fn new(driver: D) -> Self {
        Self::with_config(driver, SessionConfig::default())
    }

    /// Create a session with an explicit configuration.
    pub fn with_config(driver: D, config: SessionConfig) -> Self {
        Self {
            driver,
            config,
            registry: EntityChangeRegistry::new(),
            identity: HashMap::new(),
            dead: HashSet::new(),
            scopes: Vec::new(),
            undo: Vec::new(),
            events: SessionEventCallbacks::default(),
            constraints: HashMap::new(),
            next_scope_id: 0,
        }
    }

    /// Get a reference to the underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the session profile.
    pub fn profile(&self) -> SessionProfile {
        self.config.profile
    }

    /// Get a reference to the change registry.
    pub fn registry(&self) -> &EntityChangeRegistry {
        &self.registry
    }

    // ========================================================================
    // Event Registration
    // ========================================================================

    /// Register a lifecycle hook.
    ///
    /// The hook can abort the surrounding operation by returning `Err`.
    pub fn on(
        &mut self,
        event: SessionEvent,
        hook: impl FnMut() -> Result<()> + Send + 'static,
    ) {
        self.events.on(event, hook);
    }

    /// Register an entity hook.
    pub fn on_entity(
        &mut self,
        event: EntityEvent,
        hook: impl FnMut(&EntityKey) -> Result<()> + Send + 'static,
    ) {
        self.events.on_entity(event, hook);
    }

    /// Register a field hook.
    pub fn on_field(
        &mut self,
        event: FieldEvent,
        hook: impl FnMut(&EntityKey, usize) -> Result<()> + Send + 'static,
    ) {
        self.events.on_field(event, hook);
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Register a field constraint for an entity type.
    pub fn add_constraint(&mut self, entity_type: &'static str, constraint: FieldConstraint) {
        self.constraints
            .entry(entity_type)
            .or_default()
            .push(constraint);
    }

    /// Evaluate every constraint, including on-demand ones.
    pub fn validate(&self) -> Result<()> {
        let failures = self.collect_validation_failures(true);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationError::new(failures)))
        }
    }

    /// Evaluate every constraint and return the failures without erroring.
    pub fn validate_and_get_errors(&self) -> Vec<FieldFailure> {
        self.collect_validation_failures(true)
    }

    /// Collect constraint failures over all tracked entities.
    ///
    /// The commit-time pass excludes on-demand constraints; explicit
    /// validation includes them.
    fn collect_validation_failures(&self, include_on_demand: bool) -> Vec<FieldFailure> {
        let mut failures = Vec::new();
        for state in self.registry.items(PersistenceState::New).into_iter().flatten() {
            self.check_state(state, include_on_demand, &mut failures);
        }
        for state in self
            .registry
            .items(PersistenceState::Modified)
            .into_iter()
            .flatten()
        {
            self.check_state(state, include_on_demand, &mut failures);
        }
        failures
    }

    fn check_state(
        &self,
        state: &EntityState,
        include_on_demand: bool,
        failures: &mut Vec<FieldFailure>,
    ) {
        let entity_type = state.key().type_name();
        let Some(constraints) = self.constraints.get(entity_type) else {
            return;
        };
        for constraint in constraints {
            if constraint.mode == ConstraintMode::OnDemand && !include_on_demand {
                continue;
            }
            match state.current().get(constraint.field) {
                Ok(value) => {
                    if let Err(message) = constraint.check.evaluate(value) {
                        failures.push(FieldFailure {
                            entity_type,
                            field: constraint.field,
                            constraint: constraint.check.name().to_string(),
                            message,
                        });
                    }
                }
                Err(e) => failures.push(FieldFailure {
                    entity_type,
                    field: constraint.field,
                    constraint: constraint.check.name().to_string(),
                    message: e.to_string(),
                }),
            }
        }
    }

    /// Check immediate constraints for one field assignment.
    fn check_immediate(&self, key: &EntityKey, index: usize, value: &Value) -> Result<()> {
        let Some(constraints) = self.constraints.get(key.type_name()) else {
            return Ok(());
        };
        let mut failures = Vec::new();
        for constraint in constraints
            .iter()
            .filter(|c| c.field == index && c.mode == ConstraintMode::Immediate)
        {
            if let Err(message) = constraint.check.evaluate(value) {
                failures.push(FieldFailure {
                    entity_type: key.type_name(),
                    field: index,
                    constraint: constraint.check.name().to_string(),
                    message,
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(ValidationError::new(failures)))
        }
    }

    // ========================================================================
    // Entity Surface
    // ========================================================================

    /// Create a new entity in this session.
    ///
    /// Creating under the key of an entity pending removal revives it: the
    /// registry resolves the outcome to `Synchronized` when the new tuple
    /// matches the original image and to `Modified` otherwise.
    #[tracing::instrument(level = "debug", skip(self, key, data), fields(entity = %key))]
    pub fn create_entity(&mut self, key: EntityKey, data: DataTuple) -> Result<()> {
        if self.dead.contains(&key) {
            // Re-creating a cancelled stub starts a fresh entity under the key.
            self.dead.remove(&key);
            self.identity.remove(&key);
        }

        let in_tx = !self.scopes.is_empty();

        let prior_removed = match self.registry.get(&key) {
            Some(state) if state.persistence_state() == PersistenceState::Removed => {
                Some(state.clone())
            }
            Some(_) => {
                return Err(Error::Custom(format!(
                    "entity {key} is already tracked by this session"
                )));
            }
            None => None,
        };

        if let Some(prior) = prior_removed {
            let mut incoming = prior.clone();
            incoming.set_current(data);
            incoming.set_persistence_state(PersistenceState::New);
            match self.registry.register(incoming) {
                RegisterOutcome::Synchronized(state) => {
                    self.identity.insert(key.clone(), state);
                }
                RegisterOutcome::Tracked | RegisterOutcome::Retracted(_) => {}
            }
            if in_tx {
                self.undo.push(UndoRecord::Revived {
                    prior: Box::new(prior),
                });
            }
            self.events.fire_entity(EntityEvent::Created, &key)?;
            return Ok(());
        }

        if self.identity.contains_key(&key) {
            return Err(Error::Custom(format!(
                "entity {key} is already tracked by this session"
            )));
        }

        let state = EntityState::created(key.clone(), data);
        self.registry.register(state);
        if in_tx {
            self.undo.push(UndoRecord::Created { key: key.clone() });
        }
        self.events.fire_entity(EntityEvent::Created, &key)?;
        Ok(())
    }

    /// Materialize an entity loaded from storage as `Synchronized`.
    pub fn load_entity(&mut self, key: EntityKey, data: DataTuple) -> Result<()> {
        if self.registry.contains(&key) || self.identity.contains_key(&key) {
            return Err(Error::Custom(format!(
                "entity {key} is already tracked by this session"
            )));
        }
        self.identity
            .insert(key.clone(), EntityState::loaded(key, data));
        Ok(())
    }

    /// Mark an entity for removal.
    #[tracing::instrument(level = "debug", skip(self, key), fields(entity = %key))]
    pub fn remove_entity(&mut self, key: &EntityKey) -> Result<()> {
        if self.dead.contains(key) {
            return Err(Error::session(
                SessionErrorKind::EntityRemoved,
                format!("entity {key} was removed; the stub cannot be removed again"),
            ));
        }

        let prior_state = if let Some(state) = self.registry.get(key) {
            state.persistence_state()
        } else if self.identity.contains_key(key) {
            PersistenceState::Synchronized
        } else {
            return Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ));
        };
        if prior_state == PersistenceState::Removed {
            return Err(Error::session(
                SessionErrorKind::EntityRemoved,
                format!("entity {key} is already marked for removal"),
            ));
        }

        self.events.fire_entity(EntityEvent::Removing, key)?;

        let mut incoming = match self.registry.get(key) {
            Some(state) => state.clone(),
            None => self.identity.remove(key).ok_or_else(|| {
                Error::session(
                    SessionErrorKind::UnknownEntity,
                    format!("entity {key} is not tracked by this session"),
                )
            })?,
        };
        incoming.set_persistence_state(PersistenceState::Removed);
        if let RegisterOutcome::Retracted(stub) = self.registry.register(incoming) {
            // Never persisted: nothing to delete, the object becomes a dead stub.
            self.identity.insert(key.clone(), stub);
            self.dead.insert(key.clone());
        }

        if !self.scopes.is_empty() {
            self.undo.push(UndoRecord::Removed {
                key: key.clone(),
                prior_state,
            });
        }

        self.events.fire_entity(EntityEvent::Removed, key)?;
        Ok(())
    }

    /// Read a field value.
    pub fn get_field(&mut self, key: &EntityKey, index: usize) -> Result<Value> {
        if self.dead.contains(key) {
            return Err(Error::session(
                SessionErrorKind::EntityRemoved,
                format!("entity {key} was removed; the stub cannot be read"),
            ));
        }
        self.events.fire_field(FieldEvent::Getting, key, index)?;
        let value = if let Some(state) = self.registry.get(key) {
            // Entities pending removal stay readable until flushed.
            state.current().get(index)?.clone()
        } else if let Some(state) = self.identity.get(key) {
            state.current().get(index)?.clone()
        } else {
            return Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ));
        };
        self.events.fire_field(FieldEvent::Get, key, index)?;
        Ok(value)
    }

    /// Assign a field value.
    ///
    /// Fires the field hooks, enforces immediate constraints, promotes
    /// `Synchronized` entities to `Modified`, and appends an undo record
    /// while a transaction is open.
    pub fn set_field(&mut self, key: &EntityKey, index: usize, value: Value) -> Result<()> {
        if self.dead.contains(key) {
            return Err(Error::session(
                SessionErrorKind::EntityRemoved,
                format!("entity {key} was removed; the stub cannot be mutated"),
            ));
        }
        self.events.fire_field(FieldEvent::Setting, key, index)?;
        self.check_immediate(key, index, &value)?;

        let in_tx = !self.scopes.is_empty();
        if let Some(state) = self.registry.get_mut(key) {
            if state.persistence_state() == PersistenceState::Removed {
                return Err(Error::session(
                    SessionErrorKind::EntityRemoved,
                    format!("entity {key} is marked for removal and cannot be mutated"),
                ));
            }
            let previous = state.current_mut().set(index, value)?;
            if in_tx {
                self.undo.push(UndoRecord::FieldSet {
                    key: key.clone(),
                    index,
                    previous,
                });
            }
        } else if let Some(mut state) = self.identity.remove(key) {
            let previous = match state.current_mut().set(index, value) {
                Ok(previous) => previous,
                Err(e) => {
                    self.identity.insert(key.clone(), state);
                    return Err(e);
                }
            };
            state.set_persistence_state(PersistenceState::Modified);
            self.registry.register(state);
            if in_tx {
                self.undo.push(UndoRecord::StateShift {
                    key: key.clone(),
                    from: PersistenceState::Synchronized,
                });
                self.undo.push(UndoRecord::FieldSet {
                    key: key.clone(),
                    index,
                    previous,
                });
            }
        } else {
            return Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ));
        }

        self.events.fire_field(FieldEvent::Set, key, index)?;
        Ok(())
    }

    /// Current persistence state of an entity.
    pub fn persistence_state(&self, key: &EntityKey) -> Result<PersistenceState> {
        if let Some(state) = self.registry.get(key) {
            Ok(state.persistence_state())
        } else if let Some(state) = self.identity.get(key) {
            Ok(state.persistence_state())
        } else {
            Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ))
        }
    }

    /// Version token of an entity, if version-tracked.
    pub fn entity_version(&self, key: &EntityKey) -> Result<Option<Value>> {
        if let Some(state) = self.registry.get(key) {
            Ok(state.version().cloned())
        } else if let Some(state) = self.identity.get(key) {
            Ok(state.version().cloned())
        } else {
            Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ))
        }
    }

    /// Set the version token of an entity.
    pub fn set_entity_version(&mut self, key: &EntityKey, version: Option<Value>) -> Result<()> {
        if let Some(state) = self.registry.get_mut(key) {
            state.set_version(version);
            Ok(())
        } else if let Some(state) = self.identity.get_mut(key) {
            state.set_version(version);
            Ok(())
        } else {
            Err(Error::session(
                SessionErrorKind::UnknownEntity,
                format!("entity {key} is not tracked by this session"),
            ))
        }
    }

    /// Current tuple of an entity as a JSON value (diagnostics).
    pub fn snapshot_json(&self, key: &EntityKey) -> Result<serde_json::Value> {
        let state = self
            .registry
            .get(key)
            .or_else(|| self.identity.get(key))
            .ok_or_else(|| {
                Error::session(
                    SessionErrorKind::UnknownEntity,
                    format!("entity {key} is not tracked by this session"),
                )
            })?;
        serde_json::to_value(state.current()).map_err(|e| Error::Custom(e.to_string()))
    }

    // ========================================================================
    // Transaction Scopes
    // ========================================================================

    /// Open a transaction scope.
    ///
    /// `Default` mode joins the ambient transaction when one is open; `New`
    /// pushes an independent savepoint-backed scope.
    pub fn open_transaction(&mut self, mode: TransactionMode) -> Result<TransactionScope> {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        let undo_mark = self.undo.len();

        if self.scopes.is_empty() {
            self.events.fire(SessionEvent::TransactionOpening)?;
            self.driver.begin()?;
            tracing::debug!(session = %self.config.name, "Opened outermost transaction");
            self.scopes.push(ScopeEntry {
                id,
                owns_frame: true,
                savepoint: None,
                undo_mark,
                poisoned: false,
            });
        } else if mode == TransactionMode::New {
            self.events.fire(SessionEvent::TransactionOpening)?;
            let name = format!("sp_{}", self.scopes.len());
            self.driver.savepoint(&name)?;
            tracing::debug!(session = %self.config.name, savepoint = %name, "Opened nested scope");
            self.scopes.push(ScopeEntry {
                id,
                owns_frame: true,
                savepoint: Some(name),
                undo_mark,
                poisoned: false,
            });
        } else {
            // Join the ambient transaction.
            self.scopes.push(ScopeEntry {
                id,
                owns_frame: false,
                savepoint: None,
                undo_mark,
                poisoned: false,
            });
        }
        Ok(TransactionScope::new(id))
    }

    /// Dispose a transaction scope.
    ///
    /// A completed scope propagates completion upward; only the outermost
    /// close commits to storage. An incomplete scope rolls back exactly its
    /// own accumulated changes. Scopes close in LIFO order.
    pub fn close(&mut self, scope: &TransactionScope) -> Result<()> {
        let Some(top) = self.scopes.last() else {
            return Err(Error::session(
                SessionErrorKind::ScopeClosed,
                "no open transaction scope",
            ));
        };
        if top.id != scope.id() {
            let kind = if self.scopes.iter().any(|entry| entry.id == scope.id()) {
                SessionErrorKind::ScopeOrder
            } else {
                SessionErrorKind::ScopeClosed
            };
            return Err(Error::session(
                kind,
                format!("scope {} is not the innermost open scope", scope.id()),
            ));
        }

        let completed = scope.is_completed() && !top.poisoned;
        let owns_frame = top.owns_frame;
        let savepoint = top.savepoint.clone();
        let undo_mark = top.undo_mark;

        if completed {
            if owns_frame {
                if let Some(name) = &savepoint {
                    self.driver.release_savepoint(name)?;
                    self.scopes.pop();
                } else {
                    // The frame stays open if any commit step fails.
                    self.commit_outer()?;
                    self.scopes.pop();
                }
            } else {
                self.scopes.pop();
            }
            return Ok(());
        }

        if owns_frame {
            self.events.fire(SessionEvent::TransactionRollbacking)?;
            if let Some(name) = &savepoint {
                self.driver.rollback_to_savepoint(name)?;
            } else {
                self.driver.rollback()?;
            }
            self.scopes.pop();
            self.apply_undo_to(undo_mark);
            self.events.fire(SessionEvent::TransactionRollbacked)?;
        } else {
            // A joined scope has no storage frame of its own: revert in
            // memory and poison the ancestors so the frame rolls back.
            self.scopes.pop();
            self.apply_undo_to(undo_mark);
            if let Some(parent) = self.scopes.last_mut() {
                parent.poisoned = true;
            }
        }
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn is_in_transaction(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Current scope nesting depth.
    pub fn transaction_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Commit path of the outermost frame.
    fn commit_outer(&mut self) -> Result<()> {
        self.events.fire(SessionEvent::TransactionPrecommitting)?;

        let failures = self.collect_validation_failures(false);
        if !failures.is_empty() {
            return Err(Error::Validation(ValidationError::new(failures)));
        }

        if !self.registry.is_empty() {
            self.flush()?;
        }

        self.events.fire(SessionEvent::TransactionCommitting)?;
        self.driver.commit()?;
        self.undo.clear();
        self.events.fire(SessionEvent::TransactionCommitted)?;
        tracing::debug!(session = %self.config.name, "Transaction committed");
        Ok(())
    }

    /// Apply undo records above `mark` in reverse order.
    fn apply_undo_to(&mut self, mark: usize) {
        while self.undo.len() > mark {
            let Some(record) = self.undo.pop() else {
                break;
            };
            match record {
                UndoRecord::FieldSet {
                    key,
                    index,
                    previous,
                } => {
                    if let Some(state) = self.registry.get_mut(&key) {
                        if let Err(e) = state.current_mut().set(index, previous) {
                            tracing::warn!(key = %key, error = %e, "Undo skipped a field restore");
                        }
                    } else if let Some(state) = self.identity.get_mut(&key) {
                        if let Err(e) = state.current_mut().set(index, previous) {
                            tracing::warn!(key = %key, error = %e, "Undo skipped a field restore");
                        }
                    }
                }
                UndoRecord::Created { key } => {
                    if let Some(mut state) = self.registry.take(&key) {
                        state.set_persistence_state(PersistenceState::Removed);
                        self.identity.insert(key.clone(), state);
                        self.dead.insert(key);
                    }
                }
                UndoRecord::Removed { key, prior_state } => match prior_state {
                    PersistenceState::New => {
                        if let Some(mut stub) = self.identity.remove(&key) {
                            self.dead.remove(&key);
                            stub.set_persistence_state(PersistenceState::New);
                            self.registry.register(stub);
                        }
                    }
                    PersistenceState::Synchronized => {
                        if let Some(mut state) = self.registry.take(&key) {
                            state.set_persistence_state(PersistenceState::Synchronized);
                            self.identity.insert(key, state);
                        }
                    }
                    _ => {
                        if let Some(state) = self.registry.get_mut(&key) {
                            state.set_persistence_state(prior_state);
                        }
                    }
                },
                UndoRecord::StateShift { key, from } => match from {
                    PersistenceState::Synchronized => {
                        if let Some(mut state) = self.registry.take(&key) {
                            state.set_persistence_state(PersistenceState::Synchronized);
                            self.identity.insert(key, state);
                        }
                    }
                    _ => {
                        if let Some(state) = self.registry.get_mut(&key) {
                            state.set_persistence_state(from);
                        }
                    }
                },
                UndoRecord::Revived { prior } => {
                    let key = prior.key().clone();
                    self.registry.take(&key);
                    self.identity.remove(&key);
                    self.dead.remove(&key);
                    self.registry.register(*prior);
                }
                UndoRecord::Persisted {
                    promoted,
                    retracted,
                } => {
                    for (key, prior_state, prior_original) in promoted {
                        if let Some(mut state) = self.identity.remove(&key) {
                            state.set_persistence_state(prior_state);
                            state.set_original(prior_original);
                            self.registry.register(state);
                        }
                    }
                    for state in retracted {
                        self.registry.register(state);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Flush the registry to the driver immediately.
    ///
    /// Fires `Persisting`/`Persisted` around exactly one flush; does not
    /// end the ambient transaction scope. On failure the error propagates
    /// verbatim and the registry keeps its buckets, so a corrected retry
    /// succeeds without rebuilding the unit of work.
    pub fn save_changes(&mut self) -> Result<()> {
        self.flush()
    }

    /// Cancel-correct async variant of [`save_changes`](Self::save_changes).
    pub async fn save_changes_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if let Err(e) = self.events.fire(SessionEvent::Persisting) {
            return Outcome::Err(e);
        }
        let batch = self.build_persist_batch();
        if !batch.is_empty() {
            let outcome = self.driver.execute_batch_async(cx, &batch).await;
            match outcome {
                Outcome::Ok(()) => self.finish_flush(),
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        if let Err(e) = self.events.fire(SessionEvent::Persisted) {
            return Outcome::Err(e);
        }
        Outcome::Ok(())
    }

    /// Discard all buffered-but-unpersisted mutations.
    ///
    /// Entities created and never persisted become dead stubs in the
    /// `Removed` state; modified and removed entities revert to their last
    /// synchronized image. If an ambient transaction is open it rolls back,
    /// firing the rollback hooks.
    pub fn cancel_changes(&mut self) -> Result<()> {
        self.events.fire(SessionEvent::ChangesCanceling)?;

        if !self.scopes.is_empty() {
            self.events.fire(SessionEvent::TransactionRollbacking)?;
            self.driver.rollback()?;
            self.scopes.clear();
            self.undo.clear();
            self.events.fire(SessionEvent::TransactionRollbacked)?;
        }

        for mut state in self.registry.drain() {
            let key = state.key().clone();
            match state.persistence_state() {
                PersistenceState::New => {
                    state.set_persistence_state(PersistenceState::Removed);
                    self.identity.insert(key.clone(), state);
                    self.dead.insert(key);
                }
                PersistenceState::Modified | PersistenceState::Removed => {
                    match state.original().cloned() {
                        Some(original) => {
                            state.set_current(original);
                            state.set_persistence_state(PersistenceState::Synchronized);
                            self.identity.insert(key, state);
                        }
                        None => {
                            // No synchronized image to restore.
                            state.set_persistence_state(PersistenceState::Removed);
                            self.identity.insert(key.clone(), state);
                            self.dead.insert(key);
                        }
                    }
                }
                PersistenceState::Synchronized => {}
            }
        }

        self.events.fire(SessionEvent::ChangesCanceled)?;
        tracing::debug!(session = %self.config.name, "Changes cancelled");
        Ok(())
    }

    /// One flush: hooks, batch, bookkeeping.
    fn flush(&mut self) -> Result<()> {
        self.events.fire(SessionEvent::Persisting)?;
        let batch = self.build_persist_batch();
        if !batch.is_empty() {
            self.driver.execute_batch(&batch)?;
            self.finish_flush();
        }
        self.events.fire(SessionEvent::Persisted)?;
        Ok(())
    }

    /// Assemble the persist batch: inserts, then updates, then removes.
    ///
    /// Buckets are sorted by key so retries produce byte-identical batches
    /// and therefore identical driver errors.
    fn build_persist_batch(&self) -> PersistBatch {
        let mut batch = PersistBatch::new();

        let mut bucket: Vec<&EntityState> = self
            .registry
            .items(PersistenceState::New)
            .into_iter()
            .flatten()
            .collect();
        bucket.sort_by_key(|s| (s.key().type_name(), s.key().key_hash()));
        for state in bucket {
            batch.push(PersistOp::Insert {
                key: state.key().clone(),
                data: state.current().clone(),
            });
        }

        let mut bucket: Vec<&EntityState> = self
            .registry
            .items(PersistenceState::Modified)
            .into_iter()
            .flatten()
            .collect();
        bucket.sort_by_key(|s| (s.key().type_name(), s.key().key_hash()));
        for state in bucket {
            batch.push(PersistOp::Update {
                key: state.key().clone(),
                data: state.current().clone(),
                expected_version: state.version().cloned(),
            });
        }

        let mut bucket: Vec<&EntityState> = self
            .registry
            .items(PersistenceState::Removed)
            .into_iter()
            .flatten()
            .collect();
        bucket.sort_by_key(|s| (s.key().type_name(), s.key().key_hash()));
        for state in bucket {
            batch.push(PersistOp::Remove {
                key: state.key().clone(),
                expected_version: state.version().cloned(),
            });
        }

        batch
    }

    /// Post-flush bookkeeping: drain the registry, synchronize survivors.
    fn finish_flush(&mut self) {
        let record = !self.scopes.is_empty();
        let mut promoted = Vec::new();
        let mut retracted = Vec::new();

        for mut state in self.registry.drain() {
            match state.persistence_state() {
                PersistenceState::New | PersistenceState::Modified => {
                    if record {
                        promoted.push((
                            state.key().clone(),
                            state.persistence_state(),
                            state.original().cloned(),
                        ));
                    }
                    let image = state.current().clone();
                    state.set_original(Some(image));
                    state.set_persistence_state(PersistenceState::Synchronized);
                    self.identity.insert(state.key().clone(), state);
                }
                PersistenceState::Removed => {
                    if record {
                        retracted.push(state);
                    }
                }
                PersistenceState::Synchronized => {}
            }
        }

        if record && (!promoted.is_empty() || !retracted.is_empty()) {
            self.undo.push(UndoRecord::Persisted {
                promoted,
                retracted,
            });
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Execute an ad hoc query.
    ///
    /// Fires the query hooks around the command hooks. Under the server
    /// profile, pending changes are persisted first so the query observes
    /// them.
    pub fn query(&mut self, request: &QueryRequest) -> Result<Vec<DataTuple>> {
        if self.config.profile == SessionProfile::Server && !self.registry.is_empty() {
            self.flush()?;
        }
        self.events.fire(SessionEvent::QueryExecuting)?;
        self.events.fire(SessionEvent::CommandExecuting)?;
        let rows = self.driver.query(request)?;
        self.events.fire(SessionEvent::CommandExecuted)?;
        self.events.fire(SessionEvent::QueryExecuted)?;
        Ok(rows)
    }

    /// Compile a statement for repeated execution.
    pub fn prepare(&self, statement: &str) -> Result<PreparedCommand> {
        self.driver.prepare(statement)
    }

    /// Execute a prepared command.
    ///
    /// Only the command-level hooks fire; the ad hoc query hooks do not.
    pub fn execute_prepared(
        &mut self,
        command: &PreparedCommand,
        params: &[Value],
    ) -> Result<Vec<DataTuple>> {
        self.events.fire(SessionEvent::CommandExecuting)?;
        let rows = self.driver.execute_prepared(command, params)?;
        self.events.fire(SessionEvent::CommandExecuted)?;
        Ok(rows)
    }
}

impl<D: StorageDriver> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("profile", &self.config.profile)
            .field("tracked", &self.registry.count())
            .field("identity", &self.identity.len())
            .field("depth", &self.scopes.len())
            .finish()
    }
}
