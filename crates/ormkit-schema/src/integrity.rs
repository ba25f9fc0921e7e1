//! Structural reference check for filtered extraction results.
//!
//! Schema synchronization runs this check after ignore-rule processing.
//! It walks the tree looking for dangling edges the filtering may have
//! produced: foreign keys into missing tables or columns, foreign-key
//! columns that no longer exist, and indexes keyed on missing columns.
//! Referenced tables are resolved within the same schema.

use crate::model::{ForeignKeyInfo, SchemaExtractionResult};
use ormkit_core::{Error, Result};

fn fk_effective_name(table: &str, fk: &ForeignKeyInfo) -> String {
    fk.name
        .clone()
        .unwrap_or_else(|| format!("fk_{}_{}", table, fk.column))
}

/// Verify that every structural reference in the tree resolves.
///
/// Fails with a schema-synchronization error naming the first dangling
/// edge found.
pub fn check_references(extraction: &SchemaExtractionResult) -> Result<()> {
    for catalog in &extraction.catalogs {
        for schema in &catalog.schemas {
            for table in &schema.tables {
                for fk in &table.foreign_keys {
                    let fk_name = fk_effective_name(&table.name, fk);
                    if !table.has_column(&fk.column) {
                        return Err(Error::schema_sync(format!(
                            "foreign key '{}' on table '{}' uses missing column '{}'",
                            fk_name, table.name, fk.column
                        )));
                    }
                    let Some(target) = schema.table(&fk.referenced_table) else {
                        return Err(Error::schema_sync(format!(
                            "foreign key '{}' on table '{}' references missing table '{}'",
                            fk_name, table.name, fk.referenced_table
                        )));
                    };
                    if !target.has_column(&fk.referenced_column) {
                        return Err(Error::schema_sync(format!(
                            "foreign key '{}' on table '{}' references missing column '{}.{}'",
                            fk_name, table.name, fk.referenced_table, fk.referenced_column
                        )));
                    }
                }
                for index in &table.indexes {
                    for column in &index.columns {
                        if !table.has_column(column) {
                            return Err(Error::schema_sync(format!(
                                "index '{}' on table '{}' is keyed on missing column '{}'",
                                index.name, table.name, column
                            )));
                        }
                    }
                }
            }
        }
    }
    tracing::trace!("Reference check passed");
    Ok(())
}
