//! FILENAME: core/engine/src/store.rs
//! PURPOSE: Append-only row stores, one per registered entity.
//! CONTEXT: Rows are never updated or deleted. Each store keeps a primary key
//! index so the loader can check uniqueness and the join can resolve
//! foreign keys in O(1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single row, positionally aligned with its entity's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Record { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Record::new(values)
    }
}

/// Builds a `Record` from a list of values convertible into `Value`.
#[macro_export]
macro_rules! record {
    ($($value:expr),* $(,)?) => {
        $crate::store::Record::new(vec![$($crate::value::Value::from($value)),*])
    };
}

/// Append-only storage for one entity.
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    records: Vec<Record>,
    /// Primary key value -> position in `records`.
    key_index: HashMap<Value, usize>,
    key_position: usize,
}

impl RowStore {
    pub fn new(key_position: usize) -> Self {
        RowStore {
            records: Vec::new(),
            key_index: HashMap::new(),
            key_position,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.key_index.contains_key(key)
    }

    pub fn get_by_key(&self, key: &Value) -> Option<&Record> {
        self.key_index.get(key).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Appends already-validated rows.
    /// Callers guarantee keys are present and unique.
    pub(crate) fn append(&mut self, rows: Vec<Record>) {
        self.records.reserve(rows.len());
        for row in rows {
            let key = row.values[self.key_position].clone();
            self.key_index.insert(key, self.records.len());
            self.records.push(row);
        }
    }
}
