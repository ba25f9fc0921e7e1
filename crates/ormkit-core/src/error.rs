//! Error types for ormkit operations.

use std::fmt;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all ormkit operations.
#[derive(Debug)]
pub enum Error {
    /// Storage-level errors surfaced from the driver during flush/query
    Storage(StorageError),
    /// Session misuse errors (dead stubs, scope discipline, unknown keys)
    Session(SessionError),
    /// Change-registry misuse errors
    Registry(RegistryError),
    /// Schema processing errors
    Schema(SchemaError),
    /// Validation errors (aggregate of field-level failures)
    Validation(ValidationError),
    /// Tuple field access errors
    Field(FieldError),
    /// Custom error with message
    Custom(String),
}

/// Storage driver error.
#[derive(Debug, Clone)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
    /// Name of the violated constraint, when the backend reports one.
    pub constraint: Option<String>,
    /// Backend-specific detail text.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Constraint violation (unique, foreign key, check).
    ///
    /// Deterministic across retries: the same pending batch produces the
    /// same error until the offending entity is corrected or retracted.
    Constraint,
    /// Optimistic-concurrency conflict: a version-tracked row was committed
    /// by another session first. The losing flush fails entirely.
    StaleVersion,
    /// Connection-level failure
    Connection,
    /// Other backend error
    Database,
}

/// Session misuse error.
#[derive(Debug, Clone)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Mutation attempted on a removed/cancelled entity stub
    EntityRemoved,
    /// The key is not tracked by this session
    UnknownEntity,
    /// Operation requires an open transaction
    NoTransaction,
    /// Scope closed out of LIFO order
    ScopeOrder,
    /// Scope was already completed or closed
    ScopeClosed,
    /// An event hook aborted the operation
    HookAborted,
}

/// Change-registry misuse error.
#[derive(Debug, Clone)]
pub struct RegistryError {
    pub kind: RegistryErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// Bucket request for a state that is not tracked (e.g. Synchronized)
    InvalidBucket,
}

/// Schema processing error.
#[derive(Debug, Clone)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// The filtered tree contains a dangling structural reference
    Synchronization,
    /// A named node does not exist in the tree
    UnknownNode,
}

/// Aggregate of one or more field-level constraint failures.
#[derive(Debug, Clone, Default)]
pub struct ValidationError {
    pub failures: Vec<FieldFailure>,
}

/// One field-level constraint failure.
#[derive(Debug, Clone)]
pub struct FieldFailure {
    /// Entity type the failing field belongs to.
    pub entity_type: &'static str,
    /// Field index within the entity tuple.
    pub field: usize,
    /// Name of the violated constraint.
    pub constraint: String,
    /// Human-readable failure message.
    pub message: String,
}

impl ValidationError {
    /// Create an aggregate from collected failures.
    pub fn new(failures: Vec<FieldFailure>) -> Self {
        Self { failures }
    }

    /// Check whether the aggregate holds no failures.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tuple field access error.
#[derive(Debug, Clone, Copy)]
pub struct FieldError {
    /// Requested field index.
    pub index: usize,
    /// Tuple arity.
    pub arity: usize,
}

impl Error {
    /// Build a storage constraint-violation error.
    pub fn constraint(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Storage(StorageError {
            kind: StorageErrorKind::Constraint,
            message: message.into(),
            constraint: Some(constraint.into()),
            detail: None,
        })
    }

    /// Build a stale-version (optimistic concurrency) error.
    pub fn stale_version(message: impl Into<String>) -> Self {
        Error::Storage(StorageError {
            kind: StorageErrorKind::StaleVersion,
            message: message.into(),
            constraint: None,
            detail: None,
        })
    }

    /// Build a session error of the given kind.
    pub fn session(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Error::Session(SessionError {
            kind,
            message: message.into(),
        })
    }

    /// Build the invalid-bucket registry error.
    pub fn invalid_bucket(message: impl Into<String>) -> Self {
        Error::Registry(RegistryError {
            kind: RegistryErrorKind::InvalidBucket,
            message: message.into(),
        })
    }

    /// Build a schema-synchronization error.
    pub fn schema_sync(message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::Synchronization,
            message: message.into(),
        })
    }

    /// Is this a constraint violation from storage?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError {
                kind: StorageErrorKind::Constraint,
                ..
            })
        )
    }

    /// Is this an optimistic-concurrency conflict?
    pub fn is_stale_version(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError {
                kind: StorageErrorKind::StaleVersion,
                ..
            })
        )
    }

    /// Is this a dead-stub mutation error?
    pub fn is_entity_removed(&self) -> bool {
        matches!(
            self,
            Error::Session(SessionError {
                kind: SessionErrorKind::EntityRemoved,
                ..
            })
        )
    }

    /// Is this the invalid-bucket registry error?
    pub fn is_invalid_bucket(&self) -> bool {
        matches!(
            self,
            Error::Registry(RegistryError {
                kind: RegistryErrorKind::InvalidBucket,
                ..
            })
        )
    }

    /// Is this a schema-synchronization failure?
    pub fn is_schema_sync(&self) -> bool {
        matches!(
            self,
            Error::Schema(SchemaError {
                kind: SchemaErrorKind::Synchronization,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Session(e) => write!(f, "Session error: {}", e.message),
            Error::Registry(e) => write!(f, "Registry error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Field(e) => write!(
                f,
                "Field index {} out of range for tuple of arity {}",
                e.index, e.arity
            ),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(constraint) = &self.constraint {
            write!(f, "{} (constraint '{}')", self.message, constraint)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} constraint failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "; {}[{}] {}: {}",
                failure.entity_type, failure.field, failure.constraint, failure.message
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}
