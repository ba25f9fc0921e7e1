//! Entity identity keys.

use crate::value::{Value, hash_values};
use std::hash::{Hash, Hasher};

/// Unique, immutable identity of one persisted entity.
///
/// A key is the entity type name plus the key value vector. The hash is
/// precomputed from the values at construction; equality compares the type
/// name and the hash, mirroring identity-map key semantics.
#[derive(Debug, Clone)]
pub struct EntityKey {
    /// Entity type name (static metadata, not per-instance).
    type_name: &'static str,
    /// Key column values.
    values: Vec<Value>,
    /// Precomputed hash of the key values.
    hash: u64,
}

impl EntityKey {
    /// Create a key from an entity type name and key values.
    pub fn new(type_name: &'static str, values: Vec<Value>) -> Self {
        let hash = hash_values(&values);
        Self {
            type_name,
            values,
            hash,
        }
    }

    /// Convenience constructor for a single-column i64 key.
    pub fn from_id(type_name: &'static str, id: i64) -> Self {
        Self::new(type_name, vec![Value::BigInt(id)])
    }

    /// The entity type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The key column values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The precomputed key hash.
    pub fn key_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.hash == other.hash
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.hash.hash(state);
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{:016x}", self.type_name, self.hash)
    }
}
