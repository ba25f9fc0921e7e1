//! Entity change registry.
//!
//! The registry owns every tracked [`EntityState`] of one unit of work and
//! maintains the bucket invariant: each tracked state is in exactly one of
//! the New, Modified, or Removed buckets, and the total count is their sum.
//! Synchronized states are never stored.
//!
//! Registration applies the transition table:
//!
//! - `New -> Removed` retracts the entity entirely (nothing was persisted,
//!   so there is nothing to delete).
//! - `Modified -> Removed` moves buckets; the total count is unchanged.
//! - `Removed -> New` is the revival case. The registry is authoritative
//!   here: it resolves the state to `Synchronized` when the current tuple
//!   matches the original, and to `Modified` otherwise. A re-created
//!   identical row thus leaves no trace, exactly as if it was never
//!   removed.
//! - Re-registering an already correctly bucketed state is a no-op.

use crate::state::{EntityState, PersistenceState};
use ormkit_core::{EntityKey, Error, Result};
use std::collections::HashMap;

/// What [`EntityChangeRegistry::register`] did with the state.
///
/// Ownership of a state that leaves the registry is handed back to the
/// caller so the session can file it in its identity map or mark it dead.
#[derive(Debug)]
pub enum RegisterOutcome {
    /// The state is (still) tracked in one of the buckets.
    Tracked,
    /// A never-persisted entity was removed; it vanished from the registry.
    Retracted(EntityState),
    /// A revival resolved cleanly; the state is `Synchronized` and no
    /// longer tracked.
    Synchronized(EntityState),
}

/// Registry of entity states changed within one unit of work.
#[derive(Debug, Default)]
pub struct EntityChangeRegistry {
    entries: HashMap<EntityKey, EntityState>,
}

impl EntityChangeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state, applying the transition rules.
    ///
    /// The caller sets the state's `PersistenceState` before registering;
    /// the registry reacts to it, except for retraction and revival where
    /// the registry resolves the final state itself.
    pub fn register(&mut self, mut state: EntityState) -> RegisterOutcome {
        let key = state.key().clone();
        let incoming = state.persistence_state();

        let Some(existing) = self.entries.get(&key) else {
            if !incoming.is_trackable() {
                // Nothing tracked and nothing to track.
                return RegisterOutcome::Synchronized(state);
            }
            tracing::trace!(key = %key, state = ?incoming, "Tracking entity");
            self.entries.insert(key, state);
            return RegisterOutcome::Tracked;
        };

        let prior = existing.persistence_state();
        match (prior, incoming) {
            // Idempotent re-registration: refresh the stored image, keep the bucket.
            (a, b) if a == b => {
                state.set_persistence_state(prior);
                self.entries.insert(key, state);
                RegisterOutcome::Tracked
            }
            (PersistenceState::New, PersistenceState::Removed) => {
                let mut retracted = self
                    .entries
                    .remove(&key)
                    .unwrap_or(state);
                retracted.set_persistence_state(PersistenceState::Removed);
                tracing::trace!(key = %key, "Retracting never-persisted entity");
                RegisterOutcome::Retracted(retracted)
            }
            (PersistenceState::Modified, PersistenceState::Removed)
            | (PersistenceState::Synchronized, PersistenceState::Removed) => {
                state.set_persistence_state(PersistenceState::Removed);
                self.entries.insert(key, state);
                RegisterOutcome::Tracked
            }
            (PersistenceState::Removed, PersistenceState::New) => {
                if state.differs_from_original() {
                    state.set_persistence_state(PersistenceState::Modified);
                    tracing::trace!(key = %key, "Revival with divergent tuple, now Modified");
                    self.entries.insert(key, state);
                    RegisterOutcome::Tracked
                } else {
                    state.set_persistence_state(PersistenceState::Synchronized);
                    self.entries.remove(&key);
                    tracing::trace!(key = %key, "Revival with identical tuple, now Synchronized");
                    RegisterOutcome::Synchronized(state)
                }
            }
            // Field mutation on a New entity keeps it New.
            (PersistenceState::New, PersistenceState::Modified) => {
                state.set_persistence_state(PersistenceState::New);
                self.entries.insert(key, state);
                RegisterOutcome::Tracked
            }
            _ => {
                // Remaining combinations update the image without a bucket move.
                state.set_persistence_state(prior);
                self.entries.insert(key, state);
                RegisterOutcome::Tracked
            }
        }
    }

    /// Iterate the states in one bucket.
    ///
    /// The sequence is lazy and restartable: each call reflects the live
    /// registry at that moment. Requesting a non-trackable bucket
    /// (`Synchronized`) is an invalid-bucket error.
    pub fn items(
        &self,
        state: PersistenceState,
    ) -> Result<impl Iterator<Item = &EntityState> + '_> {
        if !state.is_trackable() {
            return Err(Error::invalid_bucket(format!(
                "{state:?} is not a trackable bucket"
            )));
        }
        Ok(self
            .entries
            .values()
            .filter(move |s| s.persistence_state() == state))
    }

    /// Total number of tracked states across all buckets.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Number of states in one bucket.
    ///
    /// `Synchronized` is never stored, so it always reports zero.
    pub fn count_in(&self, state: PersistenceState) -> usize {
        self.entries
            .values()
            .filter(|s| s.persistence_state() == state)
            .count()
    }

    /// Check whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a tracked state.
    pub fn get(&self, key: &EntityKey) -> Option<&EntityState> {
        self.entries.get(key)
    }

    /// Look up a tracked state mutably.
    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut EntityState> {
        self.entries.get_mut(key)
    }

    /// Check whether a key is tracked.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a tracked state, handing it back.
    pub fn take(&mut self, key: &EntityKey) -> Option<EntityState> {
        self.entries.remove(key)
    }

    /// Empty all buckets.
    ///
    /// Does not touch the persistence states of the dropped entities; that
    /// is the caller's responsibility at commit/cancel boundaries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Empty all buckets, yielding every tracked state exactly once.
    pub fn drain(&mut self) -> Vec<EntityState> {
        self.entries.drain().map(|(_, state)| state).collect()
    }
}
