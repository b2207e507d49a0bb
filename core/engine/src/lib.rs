//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the warehouse storage engine.
//! CONTEXT: Re-exports the value model, schema registry, row stores, loader
//! and catalog for use by the aggregation engine and the application.

pub mod catalog;
pub mod error;
pub mod loader;
pub mod schema;
pub mod star;
pub mod store;
pub mod value;

// Re-export commonly used types at the crate root
pub use catalog::{Catalog, LoadSummary};
pub use error::{Result, WarehouseError};
pub use schema::{EntityKind, EntityShape, FieldDef, ForeignKey, SchemaRegistry};
pub use store::{Record, RowStore};
pub use value::{FieldType, Value, DEFAULT_DATE_FORMAT};
