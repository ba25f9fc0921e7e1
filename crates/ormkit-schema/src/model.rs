//! Extracted catalog tree.
//!
//! This module models the output of schema extraction: a tree of catalogs,
//! schemas, tables, columns, and indexes. The ignore-rule engine consumes
//! and rebuilds this tree; the reference-integrity check walks it.

use serde::{Deserialize, Serialize};

/// Complete result of one schema extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaExtractionResult {
    /// All extracted catalogs (databases).
    pub catalogs: Vec<CatalogInfo>,
}

impl SchemaExtractionResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a catalog (builder pattern).
    #[must_use]
    pub fn with_catalog(mut self, catalog: CatalogInfo) -> Self {
        self.catalogs.push(catalog);
        self
    }

    /// Get a catalog by name.
    pub fn catalog(&self, name: &str) -> Option<&CatalogInfo> {
        self.catalogs.iter().find(|c| c.name == name)
    }

    /// Total number of tables, columns, and indexes in the tree.
    pub fn node_count(&self) -> usize {
        self.catalogs
            .iter()
            .flat_map(|c| &c.schemas)
            .flat_map(|s| &s.tables)
            .map(|t| 1 + t.columns.len() + t.indexes.len())
            .sum()
    }
}

/// One extracted catalog (database).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInfo {
    /// Catalog name; empty when the backend has a single unnamed catalog.
    pub name: String,
    /// Schemas in the catalog.
    pub schemas: Vec<SchemaInfo>,
}

impl CatalogInfo {
    /// Create an empty catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: Vec::new(),
        }
    }

    /// Append a schema (builder pattern).
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaInfo) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Get a schema by name.
    pub fn schema(&self, name: &str) -> Option<&SchemaInfo> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

/// One extracted schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Schema name; empty when the backend has a single unnamed schema.
    pub name: String,
    /// Tables in the schema.
    pub tables: Vec<TableInfo>,
}

impl SchemaInfo {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    /// Append a table (builder pattern).
    #[must_use]
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.tables.push(table);
        self
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// All table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Information about an extracted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns in the table.
    pub columns: Vec<ColumnInfo>,
    /// Indexes on the table.
    pub indexes: Vec<IndexInfo>,
    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableInfo {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Append a column (builder pattern).
    #[must_use]
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Append an index (builder pattern).
    #[must_use]
    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    /// Append a foreign key (builder pattern).
    #[must_use]
    pub fn with_foreign_key(mut self, fk: ForeignKeyInfo) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Information about a table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Raw SQL type as extracted.
    pub sql_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnInfo {
    /// Create a non-nullable column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
        }
    }

    /// Set nullability (builder pattern).
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Information about a table index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Key column names.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexInfo {
    /// Create an index over the given key columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Set uniqueness (builder pattern).
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Information about a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name, when the backend reports one.
    pub name: Option<String>,
    /// Referencing column in the owning table.
    pub column: String,
    /// Referenced table name.
    pub referenced_table: String,
    /// Referenced column name.
    pub referenced_column: String,
}

impl ForeignKeyInfo {
    /// Create an unnamed foreign key.
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }

    /// Set the constraint name (builder pattern).
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
