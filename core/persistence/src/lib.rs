//! FILENAME: core/persistence/src/lib.rs
//! Warehouse Persistence Module
//!
//! Handles reading CSV batches for the loader and saving/opening whole
//! warehouses as ZIP snapshots of JSON documents.

mod csv_reader;
mod error;
mod snapshot;

pub use csv_reader::{read_batch, read_batch_from_path, CsvOptions};
pub use error::PersistenceError;
pub use snapshot::{
    load_snapshot, read_snapshot, save_snapshot, write_snapshot, SnapshotManifest, WarehouseSnapshot,
    FORMAT_VERSION,
};
