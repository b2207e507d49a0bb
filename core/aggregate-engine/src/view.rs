//! FILENAME: core/aggregate-engine/src/view.rs
//! Aggregate View - the ordered result of an aggregation.
//!
//! Every grouping attribute of every row carries an explicit marker telling
//! whether it was aggregated away (`GroupValue::Total`) or holds a value,
//! which may itself be a genuine `Value::Null` from the data.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use engine::Value;

// ============================================================================
// GROUP KEY
// ============================================================================

/// One position of a grouping key.
/// Ordering: values (nulls last among them) before the total marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupValue {
    Value(Value),
    /// The attribute was aggregated away in this row's grouping set.
    Total,
}

impl GroupValue {
    pub fn value(v: impl Into<Value>) -> Self {
        GroupValue::Value(v.into())
    }

    pub fn is_total(&self) -> bool {
        matches!(self, GroupValue::Total)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            GroupValue::Value(v) => Some(v),
            GroupValue::Total => None,
        }
    }
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Value(v) => write!(f, "{}", v),
            GroupValue::Total => write!(f, "*"),
        }
    }
}

/// A grouping key tuple, one entry per result attribute.
pub type GroupKey = SmallVec<[GroupValue; 4]>;

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    /// None when the group has no non-null operand (SQL NULL aggregate).
    pub measure: Option<Decimal>,
}

impl AggregateRow {
    pub fn is_total(&self, attribute: usize) -> bool {
        self.key.get(attribute).map_or(false, GroupValue::is_total)
    }

    /// SQL GROUPING_ID: bit set for every aggregated-away attribute,
    /// leftmost attribute most significant.
    pub fn grouping_id(&self) -> u64 {
        self.key
            .iter()
            .fold(0u64, |acc, v| (acc << 1) | u64::from(v.is_total()))
    }

    pub fn is_grand_total(&self) -> bool {
        self.key.iter().all(GroupValue::is_total)
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// Ordered output of one aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Grouping attributes as written by the caller.
    pub attributes: Vec<String>,
    /// Label of the measure column.
    pub measure: String,
    pub rows: Vec<AggregateRow>,
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finds the first row whose key equals `key`.
    pub fn find(&self, key: &[GroupValue]) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| r.key.as_slice() == key)
    }

    /// Measure of the first row with this key (None if absent or null).
    pub fn measure_of(&self, key: &[GroupValue]) -> Option<Decimal> {
        self.find(key).and_then(|r| r.measure)
    }

    pub fn grand_total(&self) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| r.is_grand_total())
    }
}
