//! ormkit - unit-of-work persistence runtime with change tracking and
//! schema ignore rules.
//!
//! ormkit provides two loosely-coupled cores over a shared type layer:
//!
//! - **Change registry & transaction scopes**: per-entity persistence
//!   state tracking within a session, nested transaction scopes with
//!   savepoint backing, server/client persistence profiles, and named
//!   event hooks around every lifecycle point.
//! - **Schema ignore rules**: wildcard filter rules removing tables,
//!   columns, and indexes from an extracted catalog tree before schema
//!   comparison, plus the reference-integrity check synchronization runs
//!   on the filtered result.
//!
//! # Quick Start
//!
//! ```ignore
//! use ormkit::prelude::*;
//!
//! let mut session = Session::new(driver);
//!
//! // Track a new entity
//! let key = EntityKey::from_id("Hero", 1);
//! session.create_entity(
//!     key.clone(),
//!     DataTuple::from_values(vec![
//!         Value::Text("Spider-Man".to_string()),
//!         Value::BigInt(25),
//!     ]),
//! )?;
//!
//! // Work inside a transaction scope and commit
//! let mut scope = session.open_transaction(TransactionMode::Default)?;
//! session.set_field(&key, 1, Value::BigInt(26))?;
//! scope.complete();
//! session.close(&scope)?;
//! ```
//!
//! Ignore rules filter an extracted schema tree without mutating it:
//!
//! ```
//! use ormkit::{
//!     DomainConfiguration, IgnoreRule, IgnoreRulesHandler, MappingResolver,
//!     SchemaExtractionResult,
//! };
//!
//! let extracted = SchemaExtractionResult::new();
//! let config = DomainConfiguration::new("main", "dbo")
//!     .with_rule(IgnoreRule::column("IgnoreB*").when_table("MyEntity*"));
//! let resolver = MappingResolver::from_configuration(&config);
//! let filtered = IgnoreRulesHandler::handle(&extracted, &config, &resolver);
//! # let _ = filtered;
//! ```
//!
//! # Features
//!
//! - **Ownership clarity**: the registry owns tracked states; states that
//!   leave it are handed back, never shared
//! - **Structured concurrency**: async persist built on asupersync for
//!   cancel-correct operations
//! - **Deterministic failures**: flush errors repeat verbatim across
//!   retries until the offending entity is corrected or retracted

// Re-export all public types from sub-crates
pub use ormkit_core::{
    // asupersync re-exports
    Cx,
    // Tuple layer
    DataTuple,
    // Identity
    EntityKey,
    // Error taxonomy
    Error,
    FieldError,
    FieldFailure,
    Outcome,
    // Persistence operations
    PersistBatch,
    PersistOp,
    PreparedCommand,
    QueryRequest,
    RegistryError,
    RegistryErrorKind,
    Result,
    SchemaError,
    SchemaErrorKind,
    SessionError,
    SessionErrorKind,
    // Driver abstraction
    StorageDriver,
    StorageError,
    StorageErrorKind,
    ValidationError,
    Value,
};

pub use ormkit_core::{
    // Field constraints
    ConstraintCheck,
    ConstraintMode,
    CustomCheck,
    FieldConstraint,
};

pub use ormkit_session::{
    EntityChangeRegistry, EntityEvent, EntityState, FieldEvent, PersistenceState, RegisterOutcome,
    Session, SessionConfig, SessionEvent, SessionEventCallbacks, SessionProfile, TransactionMode,
    TransactionScope,
};

pub use ormkit_schema::{
    CatalogInfo, ColumnInfo, DomainConfiguration, ForeignKeyInfo, IgnoreRule, IgnoreRuleCollection,
    IgnoreRulesHandler, IgnoreTarget, IndexInfo, MappingResolver, NamePattern,
    SchemaExtractionResult, SchemaInfo, TableInfo, check_references,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ormkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ConstraintCheck,
        ConstraintMode,
        // asupersync
        Cx,
        DataTuple,
        DomainConfiguration,
        EntityKey,
        Error,
        FieldConstraint,
        // Schema filtering
        IgnoreRule,
        IgnoreRuleCollection,
        IgnoreRulesHandler,
        MappingResolver,
        Outcome,
        PersistenceState,
        Result,
        SchemaExtractionResult,
        // Session
        Session,
        SessionConfig,
        SessionProfile,
        StorageDriver,
        TransactionMode,
        Value,
        check_references,
    };
}
