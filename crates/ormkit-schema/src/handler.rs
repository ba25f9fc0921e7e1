//! Ignore-rule processing over an extraction result.
//!
//! [`IgnoreRulesHandler::handle`] is a pure function: it clones the input
//! tree and removes every node some rule matches. The input is never
//! mutated. Tables drop first; their columns and indexes leave the tree
//! with them, so a column or index rule scoped to a dropped table is a
//! no-op rather than an error.
//!
//! The handler performs no secondary cleanup: if the rules leave a dangling
//! reference (say, a foreign key into an ignored table), the reference
//! passes through unchanged so the downstream synchronization check fails
//! loudly instead of the tree silently hiding the problem.

use crate::ignore::{DomainConfiguration, IgnoreTarget, MappingResolver};
use crate::model::SchemaExtractionResult;

/// Applies an ignore-rule collection to an extraction result.
pub struct IgnoreRulesHandler;

impl IgnoreRulesHandler {
    /// Produce a filtered copy of `extraction`.
    pub fn handle(
        extraction: &SchemaExtractionResult,
        config: &DomainConfiguration,
        resolver: &MappingResolver,
    ) -> SchemaExtractionResult {
        let rules = &config.ignore_rules;
        let mut result = extraction.clone();
        if rules.is_empty() {
            return result;
        }

        let mut dropped_tables = 0usize;
        let mut dropped_columns = 0usize;
        let mut dropped_indexes = 0usize;

        for catalog in &mut result.catalogs {
            let database = resolver.resolve_database(&catalog.name).to_string();
            for schema in &mut catalog.schemas {
                let schema_name = resolver.resolve_schema(&schema.name).to_string();

                let before = schema.tables.len();
                schema.tables.retain(|table| {
                    !rules.iter().any(|rule| {
                        rule.matches(
                            IgnoreTarget::Table,
                            &table.name,
                            &table.name,
                            &schema_name,
                            &database,
                        )
                    })
                });
                dropped_tables += before - schema.tables.len();

                for table in &mut schema.tables {
                    let table_name = table.name.clone();

                    let before = table.columns.len();
                    table.columns.retain(|column| {
                        !rules.iter().any(|rule| {
                            rule.matches(
                                IgnoreTarget::Column,
                                &column.name,
                                &table_name,
                                &schema_name,
                                &database,
                            )
                        })
                    });
                    dropped_columns += before - table.columns.len();

                    let before = table.indexes.len();
                    table.indexes.retain(|index| {
                        !rules.iter().any(|rule| {
                            rule.matches(
                                IgnoreTarget::Index,
                                &index.name,
                                &table_name,
                                &schema_name,
                                &database,
                            )
                        })
                    });
                    dropped_indexes += before - table.indexes.len();
                }
            }
        }

        tracing::debug!(
            rules = rules.len(),
            dropped_tables,
            dropped_columns,
            dropped_indexes,
            "Applied ignore rules"
        );
        result
    }
}
