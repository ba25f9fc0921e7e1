//! Persistence states and tracked entity rows.

use ormkit_core::{DataTuple, EntityKey, Value};

/// Persistence state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceState {
    /// In sync with storage; not tracked by the change registry.
    Synchronized,
    /// Created in this unit of work; needs an insert on flush.
    New,
    /// Loaded from storage and changed; needs an update on flush.
    Modified,
    /// Marked for removal; needs a delete on flush.
    Removed,
}

impl PersistenceState {
    /// Whether the change registry keeps a bucket for this state.
    pub const fn is_trackable(self) -> bool {
        !matches!(self, PersistenceState::Synchronized)
    }
}

/// One tracked row: identity, data image, and persistence state.
///
/// The original tuple is the last storage-synchronized image; it is absent
/// for pure creations. The registry resolves ambiguous transitions (revival)
/// by diffing original against current.
#[derive(Debug, Clone)]
pub struct EntityState {
    key: EntityKey,
    persistence_state: PersistenceState,
    original: Option<DataTuple>,
    current: DataTuple,
    /// Optimistic-concurrency token carried into update/remove operations.
    version: Option<Value>,
}

impl EntityState {
    /// Create a state for a freshly created entity (no original image).
    pub fn created(key: EntityKey, current: DataTuple) -> Self {
        Self {
            key,
            persistence_state: PersistenceState::New,
            original: None,
            current,
            version: None,
        }
    }

    /// Create a state for an entity loaded from storage.
    ///
    /// The loaded tuple becomes both the original and the current image.
    pub fn loaded(key: EntityKey, tuple: DataTuple) -> Self {
        Self {
            key,
            persistence_state: PersistenceState::Synchronized,
            original: Some(tuple.clone()),
            current: tuple,
            version: None,
        }
    }

    /// Create a state with explicit images and persistence state.
    pub fn with_images(
        key: EntityKey,
        persistence_state: PersistenceState,
        original: Option<DataTuple>,
        current: DataTuple,
    ) -> Self {
        Self {
            key,
            persistence_state,
            original,
            current,
            version: None,
        }
    }

    /// Identity key.
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Current persistence state.
    pub fn persistence_state(&self) -> PersistenceState {
        self.persistence_state
    }

    /// Set the persistence state.
    pub fn set_persistence_state(&mut self, state: PersistenceState) {
        self.persistence_state = state;
    }

    /// Last storage-synchronized image, if any.
    pub fn original(&self) -> Option<&DataTuple> {
        self.original.as_ref()
    }

    /// Replace the original image.
    pub fn set_original(&mut self, original: Option<DataTuple>) {
        self.original = original;
    }

    /// Current in-memory image.
    pub fn current(&self) -> &DataTuple {
        &self.current
    }

    /// Mutable access to the current image.
    pub fn current_mut(&mut self) -> &mut DataTuple {
        &mut self.current
    }

    /// Replace the current image.
    pub fn set_current(&mut self, current: DataTuple) {
        self.current = current;
    }

    /// Version token, if the entity is version-tracked.
    pub fn version(&self) -> Option<&Value> {
        self.version.as_ref()
    }

    /// Set the version token.
    pub fn set_version(&mut self, version: Option<Value>) {
        self.version = version;
    }

    /// Whether the current image differs from the original.
    ///
    /// An absent original counts as a difference: there is no synchronized
    /// image to match.
    pub fn differs_from_original(&self) -> bool {
        match &self.original {
            Some(original) => self.current.differs_from(original),
            None => true,
        }
    }
}
