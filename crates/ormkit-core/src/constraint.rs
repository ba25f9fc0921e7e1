//! Field constraint primitives.
//!
//! Constraints attach to a field index of an entity type and carry a check
//! mode deciding *when* they are enforced:
//!
//! - [`ConstraintMode::Immediate`] - synchronously on field assignment.
//! - [`ConstraintMode::OnCommit`] - during the implicit commit-time pass.
//! - [`ConstraintMode::OnDemand`] - only via an explicit validate call;
//!   excluded from the commit-time pass.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::value::Value;

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime
/// of the program.
struct RegexCache {
    cache: std::sync::RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: std::sync::RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        // Fast path: check if already cached
        // Use unwrap_or_else to recover from poisoned lock (another thread panicked)
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        // Slow path: compile and cache
        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(pattern.to_string(), regex.clone());
        }
        Ok(regex)
    }
}

/// Global regex cache singleton.
fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Returns `false` if the pattern is invalid (logs a warning).
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in constraint, treating as non-match"
            );
            false
        }
    }
}

/// When a constraint is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintMode {
    /// Enforced synchronously on field assignment.
    Immediate,
    /// Enforced during the implicit commit-time validation pass.
    OnCommit,
    /// Enforced only by an explicit validate call; skipped at commit.
    OnDemand,
}

/// Checking function for [`ConstraintCheck::Custom`].
pub type CustomCheck = fn(&Value) -> std::result::Result<(), String>;

/// The check a constraint performs on a field value.
///
/// Checks apply to values of the matching type; a NULL value only fails
/// `NotNull`, so nullability and shape constraints compose independently.
#[derive(Debug, Clone)]
pub enum ConstraintCheck {
    /// The field must not be NULL.
    NotNull,
    /// Text/bytes length bounds (inclusive).
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Numeric range bounds (inclusive), applied to integer and double values.
    Range { min: Option<f64>, max: Option<f64> },
    /// Text must match the regex pattern.
    Pattern(String),
    /// Arbitrary check function.
    Custom(CustomCheck),
}

impl ConstraintCheck {
    /// Evaluate the check against a value.
    ///
    /// Returns the failure message on violation.
    pub fn evaluate(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            ConstraintCheck::NotNull => {
                if value.is_null() {
                    Err("value is NULL".to_string())
                } else {
                    Ok(())
                }
            }
            ConstraintCheck::Length { min, max } => {
                let len = match value {
                    Value::Text(s) => s.chars().count(),
                    Value::Bytes(b) => b.len(),
                    _ => return Ok(()),
                };
                if let Some(min) = min {
                    if len < *min {
                        return Err(format!("length {} is below minimum {}", len, min));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Err(format!("length {} exceeds maximum {}", len, max));
                    }
                }
                Ok(())
            }
            ConstraintCheck::Range { min, max } => {
                let n = match value {
                    Value::Int(i) => f64::from(*i),
                    Value::BigInt(i) => *i as f64,
                    Value::Double(d) => *d,
                    _ => return Ok(()),
                };
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("value {} is below minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("value {} exceeds maximum {}", n, max));
                    }
                }
                Ok(())
            }
            ConstraintCheck::Pattern(pattern) => match value {
                Value::Text(s) => {
                    if matches_pattern(s, pattern) {
                        Ok(())
                    } else {
                        Err(format!("'{}' does not match pattern '{}'", s, pattern))
                    }
                }
                _ => Ok(()),
            },
            ConstraintCheck::Custom(check) => check(value),
        }
    }

    /// Short name used in failure reports.
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintCheck::NotNull => "NotNull",
            ConstraintCheck::Length { .. } => "Length",
            ConstraintCheck::Range { .. } => "Range",
            ConstraintCheck::Pattern(_) => "Pattern",
            ConstraintCheck::Custom(_) => "Custom",
        }
    }
}

/// A constraint bound to one field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldConstraint {
    /// Field index within the entity tuple.
    pub field: usize,
    /// The check to perform.
    pub check: ConstraintCheck,
    /// When the check is enforced.
    pub mode: ConstraintMode,
}

impl FieldConstraint {
    /// Create a constraint for a field with the given check and mode.
    pub fn new(field: usize, check: ConstraintCheck, mode: ConstraintMode) -> Self {
        Self { field, check, mode }
    }
}
