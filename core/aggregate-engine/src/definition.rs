//! FILENAME: core/aggregate-engine/src/definition.rs
//! Aggregation Definition - The serializable description of a query.
//!
//! This module contains all the types needed to DESCRIBE an aggregation.
//! These structures are designed to be:
//! - Serializable (saved with materialized aggregates and config files)
//! - Immutable snapshots of caller intent
//! - Resolved against a catalog only when executed

use serde::{Deserialize, Serialize};
use engine::star::{PRICE_PER_UNIT, QUANTITY_SOLD, SALES_FACT};
use engine::Value;

// ============================================================================
// MEASURE
// ============================================================================

/// Supported aggregation functions for the measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Max,
    Average,
    Min,
    Count,
}

impl Default for AggregationType {
    fn default() -> Self {
        AggregationType::Sum
    }
}

impl AggregationType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregationType::Sum => "SUM",
            AggregationType::Max => "MAX",
            AggregationType::Average => "AVG",
            AggregationType::Min => "MIN",
            AggregationType::Count => "COUNT",
        }
    }
}

/// What the aggregation function is applied to, per joined fact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureOperand {
    /// A single numeric attribute.
    Attribute(String),
    /// The product of two numeric attributes (e.g. price x quantity).
    Product(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub aggregation: AggregationType,
    pub operand: MeasureOperand,
    /// Display name (defaults to e.g. "SUM(price_per_unit * quantity_sold)").
    #[serde(default)]
    pub name: Option<String>,
}

impl Measure {
    pub fn new(aggregation: AggregationType, operand: MeasureOperand) -> Self {
        Measure {
            aggregation,
            operand,
            name: None,
        }
    }

    /// Revenue: price per unit times quantity sold.
    pub fn revenue(aggregation: AggregationType) -> Self {
        Measure::new(
            aggregation,
            MeasureOperand::Product(PRICE_PER_UNIT.to_string(), QUANTITY_SOLD.to_string()),
        )
    }

    pub fn of(aggregation: AggregationType, attribute: impl Into<String>) -> Self {
        Measure::new(aggregation, MeasureOperand::Attribute(attribute.into()))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let operand = match &self.operand {
            MeasureOperand::Attribute(a) => a.clone(),
            MeasureOperand::Product(a, b) => format!("{} * {}", a, b),
        };
        format!("{}({})", self.aggregation.sql_name(), operand)
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// How result rows are grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingSpec {
    /// Conventional GROUP BY: one row per distinct combination.
    Groups(Vec<String>),
    /// Subtotals for every prefix of the list, down to the grand total.
    Rollup(Vec<String>),
    /// Explicit attribute subsets; `vec![]` inside is the grand total.
    GroupingSets(Vec<Vec<String>>),
    /// Every subset of the list.
    Cube(Vec<String>),
}

// ============================================================================
// FILTER DEFINITIONS
// ============================================================================

/// Comparison operators for filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// A predicate over joined fact rows, evaluated before grouping.
/// Uses SQL three-valued logic: a comparison involving Null is unknown and
/// an unknown predicate excludes the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPredicate {
    Compare {
        attribute: String,
        operator: ComparisonOperator,
        value: Value,
    },
    In {
        attribute: String,
        values: Vec<Value>,
    },
    IsNull(String),
    And(Vec<FilterPredicate>),
    Or(Vec<FilterPredicate>),
    Not(Box<FilterPredicate>),
}

impl FilterPredicate {
    pub fn compare(attribute: impl Into<String>, operator: ComparisonOperator, value: impl Into<Value>) -> Self {
        FilterPredicate::Compare {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, ComparisonOperator::Equals, value)
    }

    pub fn is_in(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        FilterPredicate::In {
            attribute: attribute.into(),
            values,
        }
    }

    pub fn and(self, other: FilterPredicate) -> Self {
        match self {
            FilterPredicate::And(mut parts) => {
                parts.push(other);
                FilterPredicate::And(parts)
            }
            first => FilterPredicate::And(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        FilterPredicate::Not(Box::new(self))
    }
}

// ============================================================================
// MAIN DEFINITION STRUCT
// ============================================================================

/// The complete, serializable description of one aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    /// The fact entity to aggregate (joined to every dimension it references).
    #[serde(default = "default_fact")]
    pub fact: String,

    pub measure: Measure,

    pub grouping: GroupingSpec,

    /// Restricts the joined facts before grouping.
    #[serde(default)]
    pub filter: Option<FilterPredicate>,
}

fn default_fact() -> String {
    SALES_FACT.to_string()
}

impl AggregationSpec {
    pub fn new(fact: impl Into<String>, measure: Measure, grouping: GroupingSpec) -> Self {
        AggregationSpec {
            fact: fact.into(),
            measure,
            grouping,
            filter: None,
        }
    }

    /// An aggregation over the standard sales fact.
    pub fn sales(measure: Measure, grouping: GroupingSpec) -> Self {
        Self::new(SALES_FACT, measure, grouping)
    }

    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }
}
