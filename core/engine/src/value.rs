//! FILENAME: core/engine/src/value.rs
//! PURPOSE: Typed scalar values stored in dimension and fact rows.
//! CONTEXT: `Value` is the unit every store, join and grouping key is built from.
//! Its ordering is total so grouped output is deterministic, and nulls sort
//! after every non-null value.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Date format used when none is configured (ISO-8601 calendar date).
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// FIELD TYPES
// ============================================================================

/// The declared type of a field in an entity shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    /// Fixed-point number with at most `scale` fractional digits.
    Decimal { scale: u32 },
    Text,
    Date,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Decimal { .. })
    }

    /// Normalizes a value into this type.
    /// Returns None when the value cannot be represented without loss.
    /// Null passes through; nullability is checked by the loader.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldType::Integer, Value::Integer(i)) => Some(Value::Integer(i)),
            (FieldType::Decimal { scale }, Value::Integer(i)) => {
                let mut d = Decimal::from(i);
                d.rescale(*scale);
                Some(Value::Decimal(d))
            }
            (FieldType::Decimal { scale }, Value::Decimal(d)) => {
                let mut d = if d.scale() > *scale { d.normalize() } else { d };
                if d.scale() > *scale {
                    return None;
                }
                d.rescale(*scale);
                Some(Value::Decimal(d))
            }
            (FieldType::Text, Value::Text(s)) => Some(Value::Text(s)),
            (FieldType::Date, Value::Date(d)) => Some(Value::Date(d)),
            _ => None,
        }
    }

    /// Parses raw text (e.g. a CSV cell) into a value of this type.
    /// Empty text reads as Null.
    pub fn parse(&self, text: &str, date_format: &str) -> Result<Value, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }

        let parsed = match self {
            FieldType::Integer => i64::from_str(text)
                .map(Value::Integer)
                .map_err(|e| format!("'{}' is not an integer: {}", text, e))?,
            FieldType::Decimal { .. } => Decimal::from_str(text)
                .map(Value::Decimal)
                .map_err(|e| format!("'{}' is not a decimal: {}", text, e))?,
            FieldType::Text => Value::Text(text.to_string()),
            FieldType::Date => NaiveDate::parse_from_str(text, date_format)
                .map(Value::Date)
                .map_err(|e| format!("'{}' does not match date format '{}': {}", text, date_format, e))?,
        };

        self.coerce(parsed)
            .ok_or_else(|| format!("'{}' does not fit {}", text, self))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Decimal { scale } => write!(f, "DECIMAL({})", scale),
            FieldType::Text => write!(f, "TEXT"),
            FieldType::Date => write!(f, "DATE"),
        }
    }
}

// ============================================================================
// VALUE
// ============================================================================

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value (integers widen to decimals).
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// SQL-style comparison: None if either side is null or the kinds
    /// are not comparable. Integers and decimals compare numerically.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => None,
            },
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Integer(_) => 0,
            Value::Decimal(_) => 1,
            Value::Text(_) => 2,
            Value::Date(_) => 3,
            Value::Null => 4,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => self
                .sql_cmp(other)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.kind_rank().cmp(&other.kind_rank())),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DEFAULT_DATE_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}
