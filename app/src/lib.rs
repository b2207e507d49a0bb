//! FILENAME: app/src/lib.rs
// PURPOSE: Application library for the star warehouse.
// CONTEXT: Wires the core crates into a shared, thread-safe state, adds the
// unified logging sink and JSON config, and hosts the `starwh` CLI.

pub mod api_types;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;

pub use api_types::{
    render_table, AggregateResponse, AggregateRowData, LoadResponse, RunResponse, ViewInfo, ViewResponse,
    NULL_TEXT, TOTAL_MARKER,
};
pub use cli::{execute, run, Cli, Commands, SpecArgs};
pub use config::{SourceConfig, ViewConfig, WarehouseConfig};
pub use error::{AppError, AppResult};
pub use logging::LogLevel;
pub use state::{create_warehouse_state, WarehouseState};
