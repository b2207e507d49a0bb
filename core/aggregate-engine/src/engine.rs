//! FILENAME: core/aggregate-engine/src/engine.rs
//! Aggregate Engine - The calculation core that turns joined facts into
//! grouped, rolled-up or cubed measures.
//!
//! Algorithm:
//! 1. Resolve the joined schema and every attribute the spec mentions
//! 2. Expand the grouping spec into concrete grouping sets
//! 3. Scan joined facts once; apply the filter, evaluate the operand, and
//!    feed one accumulator per (grouping set, key)
//! 4. Emit the grand-total row even when no fact survived the filter
//! 5. Sort rows by key tuple, then grouping-set order, then first appearance

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use engine::{Catalog, FieldType, Result, Value, WarehouseError};

use crate::definition::{
    AggregationSpec, AggregationType, ComparisonOperator, FilterPredicate, GroupingSpec,
    MeasureOperand,
};
use crate::join::{JoinView, JoinedSchema};
use crate::view::{AggregateResult, AggregateRow, GroupKey, GroupValue};

/// Cubes expand to 2^n grouping sets; beyond this the request is refused.
pub const MAX_CUBE_ATTRIBUTES: usize = 12;

/// Result attributes are limited to the width of the grouping id.
pub const MAX_GROUPING_ATTRIBUTES: usize = 64;

/// Presence mask over the result attributes: true = grouped, false = total.
type GroupingSet = SmallVec<[bool; 8]>;

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for computing aggregates incrementally in exact decimal.
#[derive(Debug, Clone, Default)]
pub struct AggregateAccumulator {
    pub sum: Decimal,
    pub count: u64,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl AggregateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a non-null operand.
    pub fn add(&mut self, value: Decimal) -> Result<()> {
        self.sum = self
            .sum
            .checked_add(value)
            .ok_or_else(|| WarehouseError::Overflow(format!("sum exceeds decimal range at {}", value)))?;
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        Ok(())
    }

    /// Computes the final aggregate value (None for an empty group,
    /// except COUNT which is zero).
    pub fn compute(&self, aggregation: AggregationType) -> Option<Decimal> {
        match aggregation {
            AggregationType::Count => Some(Decimal::from(self.count)),
            _ if self.count == 0 => None,
            AggregationType::Sum => Some(self.sum),
            AggregationType::Max => self.max,
            AggregationType::Min => self.min,
            AggregationType::Average => self
                .sum
                .checked_div(Decimal::from(self.count))
                .map(|avg| avg.normalize()),
        }
    }
}

// ============================================================================
// RESOLVED PARTS
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum ResolvedOperand {
    Column(usize),
    Product(usize, usize),
}

impl ResolvedOperand {
    fn evaluate(&self, row: &[&Value]) -> Result<Option<Decimal>> {
        match *self {
            ResolvedOperand::Column(c) => Ok(row[c].as_decimal()),
            ResolvedOperand::Product(a, b) => match (row[a].as_decimal(), row[b].as_decimal()) {
                (Some(x), Some(y)) => x
                    .checked_mul(y)
                    .map(Some)
                    .ok_or_else(|| WarehouseError::Overflow(format!("{} * {}", x, y))),
                _ => Ok(None),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum ResolvedFilter {
    Compare {
        column: usize,
        operator: ComparisonOperator,
        value: Value,
    },
    In {
        column: usize,
        values: Vec<Value>,
    },
    IsNull(usize),
    And(Vec<ResolvedFilter>),
    Or(Vec<ResolvedFilter>),
    Not(Box<ResolvedFilter>),
}

impl ResolvedFilter {
    /// Three-valued evaluation: None means unknown.
    fn evaluate(&self, row: &[&Value]) -> Option<bool> {
        match self {
            ResolvedFilter::Compare { column, operator, value } => {
                let ordering = row[*column].sql_cmp(value)?;
                Some(match operator {
                    ComparisonOperator::Equals => ordering == Ordering::Equal,
                    ComparisonOperator::NotEquals => ordering != Ordering::Equal,
                    ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
                    ComparisonOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                    ComparisonOperator::LessThan => ordering == Ordering::Less,
                    ComparisonOperator::LessThanOrEqual => ordering != Ordering::Greater,
                })
            }
            ResolvedFilter::In { column, values } => {
                let actual = row[*column];
                if actual.is_null() {
                    return None;
                }
                let mut unknown = false;
                for candidate in values {
                    match actual.sql_cmp(candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        None => unknown = true,
                        Some(_) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            ResolvedFilter::IsNull(column) => Some(row[*column].is_null()),
            ResolvedFilter::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.evaluate(row) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            ResolvedFilter::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.evaluate(row) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            ResolvedFilter::Not(inner) => inner.evaluate(row).map(|b| !b),
        }
    }

    fn matches(&self, row: &[&Value]) -> bool {
        self.evaluate(row) == Some(true)
    }
}

/// Per-(grouping set, key) accumulation state.
struct GroupSlot {
    set: usize,
    key: GroupKey,
    first_seen: usize,
    accumulator: AggregateAccumulator,
}

// ============================================================================
// AGGREGATE CALCULATOR
// ============================================================================

/// The main calculation engine for aggregations.
pub struct AggregateCalculator<'a> {
    spec: &'a AggregationSpec,
    schema: JoinedSchema,
    catalog: &'a Catalog,

    /// Result attribute names, as written.
    attributes: Vec<String>,

    /// Joined column of each result attribute.
    group_columns: Vec<usize>,

    /// Expanded grouping sets, in conceptual order.
    grouping_sets: Vec<GroupingSet>,

    operand: ResolvedOperand,

    filter: Option<ResolvedFilter>,
}

impl<'a> AggregateCalculator<'a> {
    /// Resolves the spec against the catalog. Fails on unknown entities,
    /// unknown attributes, or malformed grouping/filter definitions.
    pub fn new(spec: &'a AggregationSpec, catalog: &'a Catalog) -> Result<Self> {
        let schema = JoinedSchema::resolve(catalog, &spec.fact)?;

        let operand = Self::resolve_operand(&schema, &spec.measure.operand)?;
        let (attributes, group_columns, grouping_sets) = Self::expand_grouping(&schema, &spec.grouping)?;
        if attributes.len() > MAX_GROUPING_ATTRIBUTES {
            return Err(WarehouseError::InvalidSpec(format!(
                "grouping over {} attributes exceeds the limit of {}",
                attributes.len(),
                MAX_GROUPING_ATTRIBUTES
            )));
        }
        let filter = spec
            .filter
            .as_ref()
            .map(|f| Self::resolve_filter(&schema, f))
            .transpose()?;

        Ok(AggregateCalculator {
            spec,
            schema,
            catalog,
            attributes,
            group_columns,
            grouping_sets,
            operand,
            filter,
        })
    }

    fn resolve_numeric(schema: &JoinedSchema, attribute: &str) -> Result<usize> {
        let column = schema.resolve_attribute(attribute)?;
        match schema.column(column) {
            Some(c) if c.field_type.is_numeric() => Ok(column),
            Some(c) => Err(WarehouseError::InvalidSpec(format!(
                "measure operand '{}' is {}, not numeric",
                attribute, c.field_type
            ))),
            None => Err(WarehouseError::UnknownAttribute(attribute.to_string())),
        }
    }

    fn resolve_operand(schema: &JoinedSchema, operand: &MeasureOperand) -> Result<ResolvedOperand> {
        Ok(match operand {
            MeasureOperand::Attribute(a) => ResolvedOperand::Column(Self::resolve_numeric(schema, a)?),
            MeasureOperand::Product(a, b) => ResolvedOperand::Product(
                Self::resolve_numeric(schema, a)?,
                Self::resolve_numeric(schema, b)?,
            ),
        })
    }

    /// Resolves a list of attributes, rejecting repeats of the same column.
    fn resolve_list(schema: &JoinedSchema, attributes: &[String]) -> Result<Vec<usize>> {
        let mut columns = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let column = schema.resolve_attribute(attribute)?;
            if columns.contains(&column) {
                return Err(WarehouseError::InvalidSpec(format!(
                    "attribute '{}' listed more than once",
                    attribute
                )));
            }
            columns.push(column);
        }
        Ok(columns)
    }

    fn expand_grouping(
        schema: &JoinedSchema,
        grouping: &GroupingSpec,
    ) -> Result<(Vec<String>, Vec<usize>, Vec<GroupingSet>)> {
        match grouping {
            GroupingSpec::Groups(attrs) => {
                let columns = Self::resolve_list(schema, attrs)?;
                let sets = vec![SmallVec::from_elem(true, columns.len())];
                Ok((attrs.clone(), columns, sets))
            }
            GroupingSpec::Rollup(attrs) => {
                let columns = Self::resolve_list(schema, attrs)?;
                let n = columns.len();
                let sets = (0..=n)
                    .rev()
                    .map(|prefix| (0..n).map(|i| i < prefix).collect())
                    .collect();
                Ok((attrs.clone(), columns, sets))
            }
            GroupingSpec::Cube(attrs) => {
                let columns = Self::resolve_list(schema, attrs)?;
                let n = columns.len();
                if n > MAX_CUBE_ATTRIBUTES {
                    return Err(WarehouseError::InvalidSpec(format!(
                        "cube over {} attributes exceeds the limit of {}",
                        n, MAX_CUBE_ATTRIBUTES
                    )));
                }
                // Descending masks with attribute 0 as the high bit give the
                // conventional order: (a,b), (a), (b), ().
                let sets = (0..1u32 << n)
                    .rev()
                    .map(|mask| (0..n).map(|i| mask & (1 << (n - 1 - i)) != 0).collect())
                    .collect();
                Ok((attrs.clone(), columns, sets))
            }
            GroupingSpec::GroupingSets(sets) => {
                if sets.is_empty() {
                    return Err(WarehouseError::InvalidSpec(
                        "grouping sets list is empty".to_string(),
                    ));
                }
                let mut attributes: Vec<String> = Vec::new();
                let mut columns: Vec<usize> = Vec::new();
                let mut resolved_sets: Vec<Vec<usize>> = Vec::with_capacity(sets.len());
                for set in sets {
                    let set_columns = Self::resolve_list(schema, set)?;
                    for (attr, &column) in set.iter().zip(&set_columns) {
                        if !columns.contains(&column) {
                            columns.push(column);
                            attributes.push(attr.clone());
                        }
                    }
                    resolved_sets.push(set_columns);
                }
                let masks = resolved_sets
                    .iter()
                    .map(|set| columns.iter().map(|c| set.contains(c)).collect())
                    .collect();
                Ok((attributes, columns, masks))
            }
        }
    }

    fn resolve_filter(schema: &JoinedSchema, filter: &FilterPredicate) -> Result<ResolvedFilter> {
        Ok(match filter {
            FilterPredicate::Compare { attribute, operator, value } => {
                let column = Self::resolve_literal(schema, attribute, value)?;
                ResolvedFilter::Compare {
                    column,
                    operator: *operator,
                    value: value.clone(),
                }
            }
            FilterPredicate::In { attribute, values } => {
                let column = schema.resolve_attribute(attribute)?;
                for value in values {
                    Self::resolve_literal(schema, attribute, value)?;
                }
                ResolvedFilter::In {
                    column,
                    values: values.clone(),
                }
            }
            FilterPredicate::IsNull(attribute) => ResolvedFilter::IsNull(schema.resolve_attribute(attribute)?),
            FilterPredicate::And(parts) => ResolvedFilter::And(
                parts
                    .iter()
                    .map(|p| Self::resolve_filter(schema, p))
                    .collect::<Result<_>>()?,
            ),
            FilterPredicate::Or(parts) => ResolvedFilter::Or(
                parts
                    .iter()
                    .map(|p| Self::resolve_filter(schema, p))
                    .collect::<Result<_>>()?,
            ),
            FilterPredicate::Not(inner) => ResolvedFilter::Not(Box::new(Self::resolve_filter(schema, inner)?)),
        })
    }

    /// Resolves the attribute of a filter literal and checks the literal's type.
    fn resolve_literal(schema: &JoinedSchema, attribute: &str, value: &Value) -> Result<usize> {
        let column = schema.resolve_attribute(attribute)?;
        let field_type = schema
            .column(column)
            .map(|c| c.field_type)
            .ok_or_else(|| WarehouseError::UnknownAttribute(attribute.to_string()))?;

        let fits = match (field_type, value) {
            (_, Value::Null) => false,
            (FieldType::Integer | FieldType::Decimal { .. }, Value::Integer(_) | Value::Decimal(_)) => true,
            (FieldType::Text, Value::Text(_)) | (FieldType::Date, Value::Date(_)) => true,
            _ => false,
        };
        if !fits {
            return Err(WarehouseError::InvalidSpec(format!(
                "filter literal {} does not fit '{}' ({}); use IsNull for null checks",
                value, attribute, field_type
            )));
        }
        Ok(column)
    }

    /// Executes the full calculation.
    pub fn calculate(&self) -> Result<AggregateResult> {
        let view = self.schema.bind(self.catalog)?;
        let mut slots = self.accumulate(&view)?;

        // Step 4: grand-total sets always produce a row
        for (set_index, set) in self.grouping_sets.iter().enumerate() {
            if set.iter().any(|&grouped| grouped) || slots.iter().any(|s| s.set == set_index) {
                continue;
            }
            slots.push(GroupSlot {
                set: set_index,
                key: SmallVec::from_elem(GroupValue::Total, set.len()),
                first_seen: usize::MAX,
                accumulator: AggregateAccumulator::new(),
            });
        }

        // Step 5: deterministic order
        slots.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.set.cmp(&b.set))
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });

        let aggregation = self.spec.measure.aggregation;
        let rows = slots
            .into_iter()
            .map(|slot| AggregateRow {
                measure: slot.accumulator.compute(aggregation),
                key: slot.key,
            })
            .collect();

        Ok(AggregateResult {
            attributes: self.attributes.clone(),
            measure: self.spec.measure.label(),
            rows,
        })
    }

    /// Step 3: single scan over the joined facts.
    fn accumulate(&self, view: &JoinView<'_>) -> Result<Vec<GroupSlot>> {
        let mut index: FxHashMap<(usize, GroupKey), usize> = FxHashMap::default();
        let mut slots: Vec<GroupSlot> = Vec::new();

        for (position, row) in view.rows().enumerate() {
            if let Some(filter) = &self.filter {
                if !filter.matches(&row) {
                    continue;
                }
            }

            let operand = self.operand.evaluate(&row)?;

            for (set_index, set) in self.grouping_sets.iter().enumerate() {
                let key: GroupKey = self
                    .group_columns
                    .iter()
                    .zip(set.iter())
                    .map(|(&column, &grouped)| {
                        if grouped {
                            GroupValue::Value(row[column].clone())
                        } else {
                            GroupValue::Total
                        }
                    })
                    .collect();

                let slot_index = match index.get(&(set_index, key.clone())) {
                    Some(&i) => i,
                    None => {
                        let i = slots.len();
                        index.insert((set_index, key.clone()), i);
                        slots.push(GroupSlot {
                            set: set_index,
                            key,
                            first_seen: position,
                            accumulator: AggregateAccumulator::new(),
                        });
                        i
                    }
                };

                if let Some(value) = operand {
                    slots[slot_index].accumulator.add(value)?;
                }
            }
        }

        Ok(slots)
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Runs an aggregation against the catalog's current contents.
/// This is the main entry point for the calculation engine.
pub fn aggregate(catalog: &Catalog, spec: &AggregationSpec) -> Result<AggregateResult> {
    AggregateCalculator::new(spec, catalog)?.calculate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AggregationType, FilterPredicate, Measure};
    use chrono::NaiveDate;
    use engine::record;
    use engine::{EntityShape, FieldDef};
    use engine::star::{date_record, DATE_DIMENSION, PRODUCT_DIMENSION, SALES_FACT, SEGMENT_DIMENSION};
    use rust_decimal_macros::dec;

    fn total() -> GroupValue {
        GroupValue::Total
    }

    fn v(value: impl Into<Value>) -> GroupValue {
        GroupValue::value(value)
    }

    /// Two 2024 sales (NY: 10 x 5.00, LA: 5 x 5.00) and one 2023 sale in a
    /// segment whose city is unknown.
    fn create_test_catalog() -> Catalog {
        let mut catalog = Catalog::with_star_schema().unwrap();
        catalog
            .load_batch(
                DATE_DIMENSION,
                vec![
                    date_record(1, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
                    date_record(2, NaiveDate::from_ymd_opt(2023, 11, 20).unwrap()),
                ],
            )
            .unwrap();
        catalog
            .load_batch(PRODUCT_DIMENSION, vec![record![1, "Laptop"], record![2, "Phone"]])
            .unwrap();
        catalog
            .load_batch(
                SEGMENT_DIMENSION,
                vec![record![1, "NY"], record![2, "LA"], record![3, Option::<&str>::None]],
            )
            .unwrap();
        catalog
            .load_batch(
                SALES_FACT,
                vec![
                    record!["S1", 1, 1, 1, dec!(5.00), 10],
                    record!["S2", 1, 2, 2, dec!(5.00), 5],
                ],
            )
            .unwrap();
        catalog
    }

    fn add_unknown_city_sale(catalog: &mut Catalog) {
        catalog
            .load_batch(SALES_FACT, vec![record!["S3", 2, 1, 3, dec!(2.50), 4]])
            .unwrap();
    }

    #[test]
    fn test_rollup_year_city() {
        let catalog = create_test_catalog();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["Year".to_string(), "City".to_string()]),
        );

        let result = aggregate(&catalog, &spec).unwrap();

        let keys: Vec<Vec<GroupValue>> = result.rows.iter().map(|r| r.key.to_vec()).collect();
        assert_eq!(
            keys,
            vec![
                vec![v(2024), v("LA")],
                vec![v(2024), v("NY")],
                vec![v(2024), total()],
                vec![total(), total()],
            ]
        );
        assert_eq!(result.measure_of(&[v(2024), v("NY")]), Some(dec!(50.00)));
        assert_eq!(result.measure_of(&[v(2024), v("LA")]), Some(dec!(25.00)));
        assert_eq!(result.measure_of(&[v(2024), total()]), Some(dec!(75.00)));
        assert_eq!(result.measure_of(&[total(), total()]), Some(dec!(75.00)));
        assert_eq!(result.measure, "SUM(price_per_unit * quantity_sold)");
    }

    #[test]
    fn test_plain_groups() {
        let catalog = create_test_catalog();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Max),
            GroupingSpec::Groups(vec!["product_type".to_string()]),
        );

        let result = aggregate(&catalog, &spec).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.rows[0].key.to_vec(), vec![v("Laptop")]);
        assert_eq!(result.rows[0].measure, Some(dec!(50.00)));
        assert!(result.rows.iter().all(|r| r.grouping_id() == 0));
    }

    #[test]
    fn test_cube_produces_every_subset() {
        let catalog = create_test_catalog();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Cube(vec!["year".to_string(), "product_type".to_string()]),
        );

        let result = aggregate(&catalog, &spec).unwrap();

        // (year, type) x2, (year) x1, (type) x2, () x1
        assert_eq!(result.len(), 6);
        assert_eq!(result.measure_of(&[total(), v("Phone")]), Some(dec!(25.00)));
        assert_eq!(result.measure_of(&[v(2024), total()]), Some(dec!(75.00)));
        assert_eq!(result.rows.last().unwrap().grouping_id(), 0b11);
        let ids: Vec<u64> = result.rows.iter().map(|r| r.grouping_id()).collect();
        assert_eq!(ids, vec![0, 0, 1, 2, 2, 3]);
    }

    #[test]
    fn test_grouping_sets_union_attributes() {
        let catalog = create_test_catalog();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::GroupingSets(vec![
                vec!["city".to_string()],
                vec!["product_type".to_string()],
                vec![],
            ]),
        );

        let result = aggregate(&catalog, &spec).unwrap();

        assert_eq!(result.attributes, vec!["city".to_string(), "product_type".to_string()]);
        assert_eq!(result.len(), 5);
        assert_eq!(result.measure_of(&[v("NY"), total()]), Some(dec!(50.00)));
        assert_eq!(result.measure_of(&[total(), v("Phone")]), Some(dec!(25.00)));
        assert!(result.rows.last().unwrap().is_grand_total());
    }

    #[test]
    fn test_null_city_is_distinct_from_rollup_total() {
        let mut catalog = create_test_catalog();
        add_unknown_city_sale(&mut catalog);
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["city".to_string()]),
        );

        let result = aggregate(&catalog, &spec).unwrap();

        let keys: Vec<Vec<GroupValue>> = result.rows.iter().map(|r| r.key.to_vec()).collect();
        assert_eq!(
            keys,
            vec![vec![v("LA")], vec![v("NY")], vec![v(Value::Null)], vec![total()]]
        );
        let null_row = &result.rows[2];
        assert!(!null_row.is_total(0));
        assert_eq!(null_row.measure, Some(dec!(10.00)));
        assert_eq!(result.rows[3].measure, Some(dec!(85.00)));
        assert!(result.rows[3].is_total(0));
    }

    #[test]
    fn test_filter_applies_before_grouping() {
        let mut catalog = create_test_catalog();
        add_unknown_city_sale(&mut catalog);
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["year".to_string()]),
        )
        .with_filter(FilterPredicate::equals("year", 2023));

        let result = aggregate(&catalog, &spec).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.measure_of(&[v(2023)]), Some(dec!(10.00)));
        assert_eq!(result.measure_of(&[total()]), Some(dec!(10.00)));
    }

    #[test]
    fn test_null_comparisons_are_unknown() {
        let mut catalog = create_test_catalog();
        add_unknown_city_sale(&mut catalog);
        let not_ny = FilterPredicate::equals("city", "NY").negate();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Groups(vec![]),
        )
        .with_filter(not_ny);

        let result = aggregate(&catalog, &spec).unwrap();

        // Only LA survives: NOT(NULL = 'NY') is unknown
        assert_eq!(result.rows[0].measure, Some(dec!(25.00)));

        let spec = spec.with_filter(FilterPredicate::IsNull("city".to_string()));
        let result = aggregate(&catalog, &spec).unwrap();
        assert_eq!(result.rows[0].measure, Some(dec!(10.00)));
    }

    #[test]
    fn test_grand_total_over_empty_input() {
        let catalog = create_test_catalog();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["year".to_string()]),
        )
        .with_filter(FilterPredicate::equals("year", 1999));

        let result = aggregate(&catalog, &spec).unwrap();

        assert_eq!(result.len(), 1);
        assert!(result.rows[0].is_grand_total());
        assert_eq!(result.rows[0].measure, None);
    }

    #[test]
    fn test_average_and_count() {
        let catalog = create_test_catalog();
        let avg = AggregationSpec::sales(
            Measure::revenue(AggregationType::Average),
            GroupingSpec::Groups(vec![]),
        );
        let count = AggregationSpec::sales(
            Measure::of(AggregationType::Count, "quantity_sold"),
            GroupingSpec::Groups(vec![]),
        );

        assert_eq!(aggregate(&catalog, &avg).unwrap().rows[0].measure, Some(dec!(37.5)));
        assert_eq!(aggregate(&catalog, &count).unwrap().rows[0].measure, Some(dec!(2)));
    }

    #[test]
    fn test_unknown_attribute() {
        let catalog = create_test_catalog();
        let bad_group = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["year".to_string(), "region".to_string()]),
        );
        let bad_measure = AggregationSpec::sales(
            Measure::of(AggregationType::Sum, "discount"),
            GroupingSpec::Groups(vec![]),
        );
        let bad_filter = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Groups(vec![]),
        )
        .with_filter(FilterPredicate::equals("country", "US"));

        for spec in [bad_group, bad_measure, bad_filter] {
            assert!(matches!(
                aggregate(&catalog, &spec),
                Err(WarehouseError::UnknownAttribute(_))
            ));
        }
    }

    #[test]
    fn test_invalid_specs() {
        let catalog = create_test_catalog();
        let text_measure = AggregationSpec::sales(
            Measure::of(AggregationType::Sum, "city"),
            GroupingSpec::Groups(vec![]),
        );
        let repeated = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Cube(vec!["year".to_string(), "dim_date.YEAR".to_string()]),
        );
        let bad_literal = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Groups(vec![]),
        )
        .with_filter(FilterPredicate::equals("year", "2024"));

        for spec in [text_measure, repeated, bad_literal] {
            assert!(matches!(
                aggregate(&catalog, &spec),
                Err(WarehouseError::InvalidSpec(_))
            ));
        }
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let mut catalog = create_test_catalog();
        add_unknown_city_sale(&mut catalog);
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Cube(vec![
                "year".to_string(),
                "city".to_string(),
                "product_type".to_string(),
            ]),
        );

        let first = aggregate(&catalog, &spec).unwrap();
        for _ in 0..5 {
            assert_eq!(aggregate(&catalog, &spec).unwrap(), first);
        }
    }

    #[test]
    fn test_revenue_overflow_is_an_error() {
        let mut catalog = create_test_catalog();
        catalog
            .load_batch(
                SALES_FACT,
                vec![record!["S9", 1, 1, 1, dec!(70000000000000000000000000.00), i64::MAX]],
            )
            .unwrap();
        let spec = AggregationSpec::sales(
            Measure::revenue(AggregationType::Sum),
            GroupingSpec::Rollup(vec!["city".to_string()]),
        );

        assert!(matches!(aggregate(&catalog, &spec), Err(WarehouseError::Overflow(_))));
    }

    #[test]
    fn test_accumulator_sum_overflow() {
        let mut acc = AggregateAccumulator::new();
        acc.add(Decimal::MAX).unwrap();
        assert!(matches!(acc.add(Decimal::MAX), Err(WarehouseError::Overflow(_))));
        assert_eq!(acc.count, 1);
        assert_eq!(acc.compute(AggregationType::Sum), Some(Decimal::MAX));
    }

    #[test]
    fn test_grouping_attribute_limit() {
        let fields: Vec<FieldDef> = std::iter::once(FieldDef::new("id", FieldType::Integer))
            .chain((0..65).map(|i| FieldDef::new(format!("a{}", i), FieldType::Integer).nullable()))
            .collect();
        let names: Vec<String> = (0..65).map(|i| format!("a{}", i)).collect();
        let mut catalog = Catalog::new();
        catalog
            .register(EntityShape::new("wide", fields, "id", vec![]))
            .unwrap();

        let spec = |attrs: &[String]| {
            AggregationSpec::new(
                "wide",
                Measure::new(AggregationType::Count, MeasureOperand::Attribute("id".to_string())),
                GroupingSpec::Groups(attrs.to_vec()),
            )
        };

        assert!(matches!(
            aggregate(&catalog, &spec(&names)),
            Err(WarehouseError::InvalidSpec(_))
        ));
        let result = aggregate(&catalog, &spec(&names[..64])).unwrap();
        assert!(result.is_empty());
    }
}
