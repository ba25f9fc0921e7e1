//! Ignore rules and their configuration carrier.
//!
//! An [`IgnoreRule`] targets tables, columns, or indexes by a wildcard name
//! pattern, optionally scoped to an enclosing table, schema, and database.
//! Absent scope qualifiers are wildcards: a rule with no qualifiers matches
//! globally across every catalog and schema. Present qualifiers AND
//! together.

use crate::pattern::NamePattern;
use serde::{Deserialize, Serialize};

/// Node kind an ignore rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreTarget {
    /// Drop matching tables (with their columns and indexes).
    Table,
    /// Drop matching columns.
    Column,
    /// Drop matching indexes.
    Index,
}

/// One wildcard-capable filter rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoreRule {
    target: IgnoreTarget,
    pattern: NamePattern,
    table_scope: Option<NamePattern>,
    schema_scope: Option<NamePattern>,
    database_scope: Option<NamePattern>,
}

impl IgnoreRule {
    fn new(target: IgnoreTarget, pattern: &str) -> Self {
        Self {
            target,
            pattern: NamePattern::parse(pattern),
            table_scope: None,
            schema_scope: None,
            database_scope: None,
        }
    }

    /// Rule dropping tables whose name matches `pattern`.
    pub fn table(pattern: &str) -> Self {
        Self::new(IgnoreTarget::Table, pattern)
    }

    /// Rule dropping columns whose name matches `pattern`.
    pub fn column(pattern: &str) -> Self {
        Self::new(IgnoreTarget::Column, pattern)
    }

    /// Rule dropping indexes whose name matches `pattern`.
    pub fn index(pattern: &str) -> Self {
        Self::new(IgnoreTarget::Index, pattern)
    }

    /// Restrict the rule to enclosing tables matching `pattern`.
    #[must_use]
    pub fn when_table(mut self, pattern: &str) -> Self {
        self.table_scope = Some(NamePattern::parse(pattern));
        self
    }

    /// Restrict the rule to schemas matching `pattern`.
    #[must_use]
    pub fn when_schema(mut self, pattern: &str) -> Self {
        self.schema_scope = Some(NamePattern::parse(pattern));
        self
    }

    /// Restrict the rule to databases matching `pattern`.
    #[must_use]
    pub fn when_database(mut self, pattern: &str) -> Self {
        self.database_scope = Some(NamePattern::parse(pattern));
        self
    }

    /// The node kind this rule targets.
    pub fn target(&self) -> IgnoreTarget {
        self.target
    }

    /// The name pattern.
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    /// Check whether this rule drops the given node.
    ///
    /// `table` is the enclosing table for column/index nodes and the node's
    /// own name for table nodes.
    pub fn matches(
        &self,
        target: IgnoreTarget,
        name: &str,
        table: &str,
        schema: &str,
        database: &str,
    ) -> bool {
        self.target == target
            && self.pattern.matches(name)
            && self
                .table_scope
                .as_ref()
                .is_none_or(|scope| scope.matches(table))
            && self
                .schema_scope
                .as_ref()
                .is_none_or(|scope| scope.matches(schema))
            && self
                .database_scope
                .as_ref()
                .is_none_or(|scope| scope.matches(database))
    }
}

/// An ordered collection of ignore rules.
///
/// Multiple rules may match the same node; removal is an idempotent union.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoreRuleCollection {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRuleCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule.
    pub fn push(&mut self, rule: IgnoreRule) {
        self.rules.push(rule);
    }

    /// Append a rule (builder pattern).
    #[must_use]
    pub fn with(mut self, rule: IgnoreRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append every rule from `rules`, preserving order.
    pub fn extend(&mut self, rules: impl IntoIterator<Item = IgnoreRule>) {
        self.rules.extend(rules);
    }

    /// Iterate the rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &IgnoreRule> + '_ {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check whether the collection holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<IgnoreRule>> for IgnoreRuleCollection {
    fn from(rules: Vec<IgnoreRule>) -> Self {
        Self { rules }
    }
}

/// Domain-level configuration consumed by schema processing.
#[derive(Debug, Clone, Default)]
pub struct DomainConfiguration {
    /// Rules removing nodes before schema comparison.
    pub ignore_rules: IgnoreRuleCollection,
    /// Database name assumed for catalogs extracted without one.
    pub default_database: String,
    /// Schema name assumed for schemas extracted without one.
    pub default_schema: String,
}

impl DomainConfiguration {
    /// Create a configuration with the given default database/schema names.
    pub fn new(default_database: impl Into<String>, default_schema: impl Into<String>) -> Self {
        Self {
            ignore_rules: IgnoreRuleCollection::new(),
            default_database: default_database.into(),
            default_schema: default_schema.into(),
        }
    }

    /// Append an ignore rule (builder pattern).
    #[must_use]
    pub fn with_rule(mut self, rule: IgnoreRule) -> Self {
        self.ignore_rules.push(rule);
        self
    }
}

/// Resolves effective database/schema names for extracted nodes.
///
/// Backends that expose a single unnamed catalog or schema extract empty
/// names; the resolver substitutes the configured defaults so scope
/// qualifiers match the names users write.
#[derive(Debug, Clone)]
pub struct MappingResolver {
    default_database: String,
    default_schema: String,
}

impl MappingResolver {
    /// Create a resolver with explicit defaults.
    pub fn new(default_database: impl Into<String>, default_schema: impl Into<String>) -> Self {
        Self {
            default_database: default_database.into(),
            default_schema: default_schema.into(),
        }
    }

    /// Create a resolver from a domain configuration.
    pub fn from_configuration(config: &DomainConfiguration) -> Self {
        Self::new(&config.default_database, &config.default_schema)
    }

    /// Effective database name for an extracted catalog name.
    pub fn resolve_database<'a>(&'a self, extracted: &'a str) -> &'a str {
        if extracted.is_empty() {
            &self.default_database
        } else {
            extracted
        }
    }

    /// Effective schema name for an extracted schema name.
    pub fn resolve_schema<'a>(&'a self, extracted: &'a str) -> &'a str {
        if extracted.is_empty() {
            &self.default_schema
        } else {
            extracted
        }
    }
}
