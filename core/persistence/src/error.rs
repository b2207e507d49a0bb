//! FILENAME: core/persistence/src/error.rs

use engine::WarehouseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("CSV line {line}, column '{column}': {reason}")]
    InvalidCsv {
        line: u64,
        column: String,
        reason: String,
    },

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
}
