//! Session and unit of work for ormkit.
//!
//! `ormkit-session` is the **unit-of-work layer**. It coordinates entity
//! identity, change tracking, and transactional persistence over an opaque
//! storage driver.
//!
//! # Role In The Architecture
//!
//! - **Change registry**: buckets every pending insert, update, and delete
//!   by persistence state, resolving ambiguous transitions (revival).
//! - **Transaction scopes**: a LIFO stack of nested scopes with savepoint
//!   backing and an undo log for immediate in-memory revert.
//! - **Profiles**: server sessions persist pending changes before queries;
//!   client sessions buffer until an explicit persist.
//! - **Events**: named hooks around every lifecycle point, from
//!   transaction open to field assignment.
//!
//! # Design Philosophy
//!
//! - **Explicit over implicit**: no hidden flushes outside the documented
//!   server-profile query path.
//! - **Ownership clarity**: the registry owns tracked states; states that
//!   leave it are handed back to the session, never shared.
//! - **Cancel-correct**: the async persist path uses `Cx` + `Outcome` via
//!   `ormkit-core`.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(driver);
//!
//! // Create an entity (will be inserted on flush)
//! session.create_entity(key.clone(), tuple)?;
//!
//! // Open a transaction, mutate, commit
//! let mut scope = session.open_transaction(TransactionMode::Default)?;
//! session.set_field(&key, 0, Value::Text("renamed".into()))?;
//! scope.complete();
//! session.close(&scope)?;
//! ```

pub mod events;
pub mod registry;
pub mod scope;
pub mod session;
pub mod state;

pub use events::{EntityEvent, FieldEvent, SessionEvent, SessionEventCallbacks};
pub use registry::{EntityChangeRegistry, RegisterOutcome};
pub use scope::{TransactionMode, TransactionScope};
pub use session::{Session, SessionConfig, SessionProfile};
pub use state::{EntityState, PersistenceState};
