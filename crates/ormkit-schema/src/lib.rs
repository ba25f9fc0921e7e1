//! Extracted catalog model and schema ignore rules for ormkit.
//!
//! This crate provides:
//! - The extracted catalog tree (`SchemaExtractionResult` and node types)
//! - Wildcard name patterns with leading/trailing `*` anchors
//! - `IgnoreRule` / `IgnoreRuleCollection` and the processing handler that
//!   removes matching nodes before schema comparison
//! - The reference-integrity check run by schema synchronization

pub mod handler;
pub mod ignore;
pub mod integrity;
pub mod model;
pub mod pattern;

pub use handler::IgnoreRulesHandler;
pub use ignore::{
    DomainConfiguration, IgnoreRule, IgnoreRuleCollection, IgnoreTarget, MappingResolver,
};
pub use integrity::check_references;
pub use model::{
    CatalogInfo, ColumnInfo, ForeignKeyInfo, IndexInfo, SchemaExtractionResult, SchemaInfo,
    TableInfo,
};
pub use pattern::NamePattern;
