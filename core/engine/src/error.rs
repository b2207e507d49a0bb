//! FILENAME: core/engine/src/error.rs

use thiserror::Error;

use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarehouseError {
    #[error("Entity '{entity}' is already registered with a conflicting shape: {reason}")]
    DuplicateEntity { entity: String, reason: String },

    #[error("Duplicate key {key} in '{entity}'")]
    DuplicateKey { entity: String, key: Value },

    #[error("Dangling reference in '{entity}': {field} = {key} has no match in '{references}'")]
    DanglingReference {
        entity: String,
        field: String,
        references: String,
        key: Value,
    },

    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Name already in use: {0}")]
    NameConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid shape for '{entity}': {reason}")]
    InvalidShape { entity: String, reason: String },

    #[error("Invalid row {row} for '{entity}': {reason}")]
    InvalidRow {
        entity: String,
        row: usize,
        reason: String,
    },

    #[error("Constraint violated in '{entity}' row {row}: {reason}")]
    ConstraintViolation {
        entity: String,
        row: usize,
        reason: String,
    },

    #[error("Invalid aggregation: {0}")]
    InvalidSpec(String),

    #[error("Numeric overflow: {0}")]
    Overflow(String),

    #[error("Refresh of '{name}' was computed from version {prepared}, older than the cached version {cached}")]
    StaleRefresh { name: String, prepared: u64, cached: u64 },
}

pub type Result<T> = std::result::Result<T, WarehouseError>;
