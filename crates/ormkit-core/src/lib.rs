//! Core types and traits for ormkit.
//!
//! This crate provides the foundational abstractions shared by the
//! unit-of-work and schema layers:
//!
//! - `Value` and `DataTuple` for entity field storage
//! - `EntityKey` identity keys
//! - The error taxonomy (`Error`, `Result`)
//! - `StorageDriver` trait and persist operations
//! - Field constraint primitives with timing modes
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod constraint;
pub mod driver;
pub mod error;
pub mod key;
pub mod tuple;
pub mod value;

pub use constraint::{ConstraintCheck, ConstraintMode, CustomCheck, FieldConstraint,
    matches_pattern};
pub use driver::{PersistBatch, PersistOp, PreparedCommand, QueryRequest, StorageDriver};
pub use error::{
    Error, FieldError, FieldFailure, RegistryError, RegistryErrorKind, Result, SchemaError,
    SchemaErrorKind, SessionError, SessionErrorKind, StorageError, StorageErrorKind,
    ValidationError,
};
pub use key::EntityKey;
pub use tuple::DataTuple;
pub use value::{Value, hash_value, hash_values};
