//! FILENAME: app/src/error.rs

use engine::WarehouseError;
use persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("State lock poisoned: {0}")]
    LockPoisoned(String),
}

impl AppError {
    /// The underlying warehouse error, wherever it was wrapped.
    pub fn warehouse(&self) -> Option<&WarehouseError> {
        match self {
            AppError::Warehouse(e) => Some(e),
            AppError::Persistence(PersistenceError::Warehouse(e)) => Some(e),
            _ => None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
