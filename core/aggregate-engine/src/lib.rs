//! FILENAME: core/aggregate-engine/src/lib.rs
//! Aggregation subsystem for the star warehouse.
//!
//! This crate provides grouping aggregations over facts joined to their
//! dimensions, plus a cache of named, explicitly refreshed results. It
//! depends on `engine` for values, shapes and the catalog.
//!
//! Layers:
//! - `definition`: Serializable query description (WHAT to aggregate)
//! - `join`: Attribute namespace of a fact and its dimensions
//! - `engine`: Calculation engine (HOW we calculate)
//! - `view`: Ordered result rows with explicit total markers
//! - `materialized`: Named snapshots refreshed only on request

pub mod definition;
pub mod join;
pub mod view;
pub mod engine;
pub mod materialized;

pub use definition::*;
pub use join::{JoinView, JoinedColumn, JoinedSchema};
pub use view::*;
pub use self::engine::{aggregate, AggregateAccumulator, AggregateCalculator, MAX_CUBE_ATTRIBUTES, MAX_GROUPING_ATTRIBUTES};
pub use materialized::{MaterializedAggregate, MaterializedCache, PreparedRefresh};
