//! FILENAME: core/engine/src/star.rs
//! PURPOSE: The standard sales star schema (three dimensions, one fact).
//! CONTEXT: Also derives the calendar attributes of a date dimension row,
//! which the source extracts computed from the calendar date.

use chrono::{Datelike, NaiveDate};

use crate::schema::{EntityShape, FieldDef, ForeignKey};
use crate::store::Record;
use crate::value::{FieldType, Value};

pub const DATE_DIMENSION: &str = "dim_date";
pub const PRODUCT_DIMENSION: &str = "dim_product";
pub const SEGMENT_DIMENSION: &str = "dim_customer_segment";
pub const SALES_FACT: &str = "fact_sales";

pub const PRICE_PER_UNIT: &str = "price_per_unit";
pub const QUANTITY_SOLD: &str = "quantity_sold";

/// Fixed-point scale of monetary fields.
pub const MONEY_SCALE: u32 = 2;

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

pub fn date_dimension() -> EntityShape {
    EntityShape::new(
        DATE_DIMENSION,
        vec![
            FieldDef::new("date_id", FieldType::Integer),
            FieldDef::new("full_date", FieldType::Date),
            FieldDef::new("year", FieldType::Integer),
            FieldDef::new("quarter", FieldType::Integer),
            FieldDef::new("quarter_label", FieldType::Text),
            FieldDef::new("month", FieldType::Integer),
            FieldDef::new("month_name", FieldType::Text),
            FieldDef::new("day", FieldType::Integer),
            FieldDef::new("weekday", FieldType::Integer),
            FieldDef::new("weekday_name", FieldType::Text),
        ],
        "date_id",
        vec![],
    )
}

pub fn product_dimension() -> EntityShape {
    EntityShape::new(
        PRODUCT_DIMENSION,
        vec![
            FieldDef::new("product_id", FieldType::Integer),
            FieldDef::new("product_type", FieldType::Text).nullable(),
        ],
        "product_id",
        vec![],
    )
}

pub fn segment_dimension() -> EntityShape {
    EntityShape::new(
        SEGMENT_DIMENSION,
        vec![
            FieldDef::new("segment_id", FieldType::Integer),
            FieldDef::new("city", FieldType::Text).nullable(),
        ],
        "segment_id",
        vec![],
    )
}

pub fn sales_fact() -> EntityShape {
    EntityShape::new(
        SALES_FACT,
        vec![
            FieldDef::new("sales_id", FieldType::Text),
            FieldDef::new("date_id", FieldType::Integer),
            FieldDef::new("product_id", FieldType::Integer),
            FieldDef::new("segment_id", FieldType::Integer),
            FieldDef::new(PRICE_PER_UNIT, FieldType::Decimal { scale: MONEY_SCALE }).non_negative(),
            FieldDef::new(QUANTITY_SOLD, FieldType::Integer).non_negative(),
        ],
        "sales_id",
        vec![
            ForeignKey::new("date_id", DATE_DIMENSION),
            ForeignKey::new("product_id", PRODUCT_DIMENSION),
            ForeignKey::new("segment_id", SEGMENT_DIMENSION),
        ],
    )
}

/// All four shapes in dependency order (dimensions before the fact).
pub fn star_schema() -> Vec<EntityShape> {
    vec![
        date_dimension(),
        product_dimension(),
        segment_dimension(),
        sales_fact(),
    ]
}

/// Builds a `dim_date` row with every calendar attribute derived from `date`.
/// Weekdays are numbered 1 (Monday) to 7 (Sunday).
pub fn date_record(date_id: i64, date: NaiveDate) -> Record {
    let month = date.month();
    let quarter = (month - 1) / 3 + 1;
    let weekday = date.weekday().number_from_monday();

    Record::new(vec![
        Value::Integer(date_id),
        Value::Date(date),
        Value::Integer(i64::from(date.year())),
        Value::Integer(i64::from(quarter)),
        Value::Text(format!("Q{}", quarter)),
        Value::Integer(i64::from(month)),
        Value::text(MONTH_NAMES[(month - 1) as usize]),
        Value::Integer(i64::from(date.day())),
        Value::Integer(i64::from(weekday)),
        Value::text(WEEKDAY_NAMES[(weekday - 1) as usize]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_calendar_attributes() {
        // 2024-08-17 was a Saturday.
        let row = date_record(20240817, NaiveDate::from_ymd_opt(2024, 8, 17).unwrap());
        let shape = date_dimension();

        let get = |name: &str| row.values[shape.field_index(name).unwrap()].clone();
        assert_eq!(get("year"), Value::Integer(2024));
        assert_eq!(get("quarter"), Value::Integer(3));
        assert_eq!(get("quarter_label"), Value::text("Q3"));
        assert_eq!(get("month_name"), Value::text("August"));
        assert_eq!(get("weekday"), Value::Integer(6));
        assert_eq!(get("weekday_name"), Value::text("Saturday"));
        assert_eq!(row.len(), shape.arity());
    }
}
