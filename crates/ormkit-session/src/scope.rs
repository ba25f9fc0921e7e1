//! Transaction scopes and the in-memory undo log.
//!
//! Scopes follow strict LIFO discipline. Opening in `Default` mode joins
//! the ambient transaction when one is open; `New` mode always pushes an
//! independent frame backed by a storage savepoint. A scope records
//! completion intent via [`TransactionScope::complete`]; the session's
//! `close` decides between commit propagation and rollback.
//!
//! Every in-memory mutation made while a transaction is open appends an
//! [`UndoRecord`]; rolling a scope back applies the records above its
//! watermark in reverse order.

use crate::state::{EntityState, PersistenceState};
use ormkit_core::{DataTuple, EntityKey, Value};

/// How a transaction scope is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Join the ambient transaction when one is open, else open one.
    #[default]
    Default,
    /// Always push an independent, separately completable nested scope.
    New,
}

/// Token for one opened scope.
///
/// The token records completion intent; disposal happens through
/// `Session::close`, which commits or rolls back depending on whether
/// `complete` was called.
#[derive(Debug)]
pub struct TransactionScope {
    id: u64,
    completed: bool,
}

impl TransactionScope {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            completed: false,
        }
    }

    /// Mark this scope as successfully completed.
    ///
    /// Completion propagates upward only if every enclosing scope is also
    /// completed; only the outermost close commits to storage.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Whether `complete` was called.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Scope identifier (diagnostic).
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// One entry on the session's scope stack.
#[derive(Debug)]
pub(crate) struct ScopeEntry {
    /// Token id this entry belongs to.
    pub id: u64,
    /// Whether this entry opened a storage frame (outermost transaction or
    /// a savepoint-backed nested scope). Joined `Default` scopes do not.
    pub owns_frame: bool,
    /// Savepoint name for nested frames; `None` for the outermost frame
    /// and for joined scopes.
    pub savepoint: Option<String>,
    /// Undo-log watermark at scope entry.
    pub undo_mark: usize,
    /// Set when a joined descendant rolled back; forces rollback on close
    /// even if this scope completed.
    pub poisoned: bool,
}

/// One reversible in-memory mutation.
#[derive(Debug)]
pub(crate) enum UndoRecord {
    /// A field was assigned; `previous` restores it.
    FieldSet {
        key: EntityKey,
        index: usize,
        previous: Value,
    },
    /// An entity was created; undo retracts it into a dead stub.
    Created { key: EntityKey },
    /// An entity was removed; undo restores its prior bucket (or the
    /// identity map for `Synchronized`).
    Removed {
        key: EntityKey,
        prior_state: PersistenceState,
    },
    /// An entity moved buckets without a remove (e.g. the first field write
    /// promoting `Synchronized` to `Modified`).
    StateShift {
        key: EntityKey,
        from: PersistenceState,
    },
    /// A removed entity was revived; undo reinstates the captured state.
    Revived { prior: Box<EntityState> },
    /// A flush moved entities out of the registry; undo re-tracks them.
    Persisted {
        /// Keys flushed as insert/update, with their pre-flush bucket and
        /// pre-flush original image.
        promoted: Vec<(EntityKey, PersistenceState, Option<DataTuple>)>,
        /// Full states flushed as removals.
        retracted: Vec<EntityState>,
    },
}
