//! Fixed-arity value tuples.
//!
//! A `DataTuple` is the in-memory image of one row: an ordered vector of
//! [`Value`]s whose arity is fixed at construction. Change tracking compares
//! the current tuple against the original element-by-element, so the diff
//! operations here run in O(arity) without touching storage.

use crate::error::{Error, FieldError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// An ordered, fixed-arity vector of field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTuple {
    values: Vec<Value>,
}

impl DataTuple {
    /// Create a tuple of the given arity with every field NULL.
    pub fn new(arity: usize) -> Self {
        Self {
            values: vec![Value::Null; arity],
        }
    }

    /// Create a tuple from an explicit value vector.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of fields in this tuple.
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Get the value at a field index.
    pub fn get(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| {
            Error::Field(FieldError {
                index,
                arity: self.values.len(),
            })
        })
    }

    /// Set the value at a field index, returning the previous value.
    pub fn set(&mut self, index: usize, value: Value) -> Result<Value> {
        let arity = self.values.len();
        let slot = self.values.get_mut(index).ok_or(Error::Field(FieldError {
            index,
            arity,
        }))?;
        Ok(std::mem::replace(slot, value))
    }

    /// Borrow the underlying value slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Check whether any field differs from `other`.
    ///
    /// Tuples of different arity always differ.
    pub fn differs_from(&self, other: &DataTuple) -> bool {
        self.values.len() != other.values.len()
            || self
                .values
                .iter()
                .zip(other.values.iter())
                .any(|(a, b)| a != b)
    }

    /// Field indexes whose values differ from `other`.
    ///
    /// Indexes beyond the shorter tuple's arity are reported as changed.
    pub fn changed_indexes(&self, other: &DataTuple) -> Vec<usize> {
        let common = self.values.len().min(other.values.len());
        let longest = self.values.len().max(other.values.len());
        let mut changed: Vec<usize> = (0..common)
            .filter(|&i| self.values[i] != other.values[i])
            .collect();
        changed.extend(common..longest);
        changed
    }
}

impl From<Vec<Value>> for DataTuple {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}
