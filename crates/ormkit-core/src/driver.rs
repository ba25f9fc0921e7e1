//! Storage driver abstraction.
//!
//! The session layer talks to storage through [`StorageDriver`]: an opaque
//! "execute a batch of persist operations" collaborator plus the transaction
//! verbs the scope stack delegates to (begin/commit/rollback and savepoints
//! for nested scopes).
//!
//! Everything is synchronous except [`StorageDriver::execute_batch_async`],
//! the fire-and-await persist path: it either applies the whole batch or
//! fails without partial effects, and integrates with asupersync's
//! structured concurrency via `Cx` for cancellation.

use crate::error::{Error, Result};
use crate::key::EntityKey;
use crate::tuple::DataTuple;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A single persist operation within a flush batch.
#[derive(Debug, Clone)]
pub enum PersistOp {
    /// Insert a new row.
    Insert {
        /// Identity of the row.
        key: EntityKey,
        /// Full field tuple.
        data: DataTuple,
    },
    /// Update an existing row.
    Update {
        /// Identity of the row.
        key: EntityKey,
        /// Full field tuple after modification.
        data: DataTuple,
        /// Version token the row must still carry, for version-tracked
        /// entities. `None` disables the check.
        expected_version: Option<Value>,
    },
    /// Remove an existing row.
    Remove {
        /// Identity of the row.
        key: EntityKey,
        /// Version token the row must still carry. `None` disables the check.
        expected_version: Option<Value>,
    },
}

impl PersistOp {
    /// Identity of the row this operation addresses.
    pub fn key(&self) -> &EntityKey {
        match self {
            PersistOp::Insert { key, .. }
            | PersistOp::Update { key, .. }
            | PersistOp::Remove { key, .. } => key,
        }
    }
}

/// An ordered batch of persist operations.
///
/// Batches preserve insert -> update -> remove order as assembled by the
/// flush path and are applied atomically: the driver either applies every
/// operation or fails leaving storage untouched.
#[derive(Debug, Clone, Default)]
pub struct PersistBatch {
    ops: Vec<PersistOp>,
}

impl PersistBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    pub fn push(&mut self, op: PersistOp) {
        self.ops.push(op);
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[PersistOp] {
        &self.ops
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An ad hoc query request.
///
/// The statement text is opaque to the engine; translation happens upstream.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Backend statement text.
    pub statement: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl QueryRequest {
    /// Create a request with no parameters.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    /// Attach positional parameters (builder pattern).
    #[must_use]
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// A precompiled command for repeated execution.
///
/// Prepared commands are compiled once by the driver and executed with
/// different parameter values; the session fires only command-level hooks
/// for them, never the ad hoc query hooks.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    /// Driver-specific identifier.
    id: u64,
    /// The original statement text.
    statement: String,
}

impl PreparedCommand {
    /// Create a prepared command. Typically called by the driver.
    pub fn new(id: u64, statement: String) -> Self {
        Self { id, statement }
    }

    /// The driver-specific identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The original statement text.
    pub fn statement(&self) -> &str {
        &self.statement
    }
}

/// A storage backend capable of persisting entity state.
///
/// Implementations must be `Send + Sync`; drivers use interior mutability
/// so sessions can share one driver instance.
pub trait StorageDriver: Send + Sync {
    /// Begin a storage transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the current storage transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the current storage transaction.
    fn rollback(&self) -> Result<()>;

    /// Create a named savepoint within the current transaction.
    fn savepoint(&self, name: &str) -> Result<()>;

    /// Roll back to a previously created savepoint.
    ///
    /// Changes made after the savepoint are discarded; the transaction
    /// remains active.
    fn rollback_to_savepoint(&self, name: &str) -> Result<()>;

    /// Release a savepoint without discarding its changes.
    fn release_savepoint(&self, name: &str) -> Result<()>;

    /// Apply a persist batch atomically.
    ///
    /// On failure storage is untouched and the error is deterministic: the
    /// same pending batch yields the same error on retry.
    fn execute_batch(&self, batch: &PersistBatch) -> Result<()>;

    /// Apply a persist batch atomically, cancel-correct variant.
    ///
    /// The default implementation wraps [`execute_batch`](Self::execute_batch);
    /// drivers with a native async path override this.
    fn execute_batch_async(
        &self,
        cx: &Cx,
        batch: &PersistBatch,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let _ = cx;
        async move {
            match self.execute_batch(batch) {
                Ok(()) => Outcome::Ok(()),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    /// Execute an ad hoc query and return result tuples.
    fn query(&self, request: &QueryRequest) -> Result<Vec<DataTuple>>;

    /// Compile a statement for repeated execution.
    fn prepare(&self, statement: &str) -> Result<PreparedCommand>;

    /// Execute a prepared command and return result tuples.
    fn execute_prepared(&self, command: &PreparedCommand, params: &[Value])
    -> Result<Vec<DataTuple>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_preserves_order() {
        let mut batch = PersistBatch::new();
        batch.push(PersistOp::Insert {
            key: EntityKey::from_id("Hero", 1),
            data: DataTuple::new(2),
        });
        batch.push(PersistOp::Remove {
            key: EntityKey::from_id("Hero", 2),
            expected_version: None,
        });

        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.ops()[0], PersistOp::Insert { .. }));
        assert!(matches!(batch.ops()[1], PersistOp::Remove { .. }));
    }

    #[test]
    fn test_op_key_accessor() {
        let op = PersistOp::Update {
            key: EntityKey::from_id("Hero", 3),
            data: DataTuple::new(1),
            expected_version: Some(Value::BigInt(7)),
        };
        assert_eq!(op.key(), &EntityKey::from_id("Hero", 3));
    }

    #[test]
    fn test_query_request_builder() {
        let request = QueryRequest::new("select Hero").with_params(vec![Value::BigInt(1)]);
        assert_eq!(request.statement, "select Hero");
        assert_eq!(request.params.len(), 1);
    }
}
