//! FILENAME: core/engine/src/loader.rs
//! PURPOSE: Batch validation for the Loader.
//! CONTEXT: A batch is validated completely before anything is appended.
//! The catalog only commits the normalized rows this module returns, which
//! is what makes a load all-or-nothing.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, WarehouseError};
use crate::schema::EntityShape;
use crate::store::{Record, RowStore};
use crate::value::Value;

/// Validates `rows` against `shape` and the current stores.
///
/// Checks, in order, per row: arity, field types (with normalization),
/// nullability, field constraints, primary key uniqueness (against the store
/// and the rest of the batch), and foreign key resolution.
pub fn validate_batch(
    shape: &EntityShape,
    target: &RowStore,
    stores: &HashMap<String, RowStore>,
    rows: Vec<Record>,
) -> Result<Vec<Record>> {
    let key_index = shape.primary_key_index().ok_or_else(|| WarehouseError::InvalidShape {
        entity: shape.name.clone(),
        reason: "primary key is not a field".to_string(),
    })?;

    let references = resolve_references(shape, stores)?;

    let mut batch_keys: HashSet<Value> = HashSet::with_capacity(rows.len());
    let mut validated = Vec::with_capacity(rows.len());

    for (row_number, row) in rows.into_iter().enumerate() {
        let row = normalize_row(shape, row_number, row)?;

        let key = &row.values[key_index];
        if target.contains_key(key) || !batch_keys.insert(key.clone()) {
            return Err(WarehouseError::DuplicateKey {
                entity: shape.name.clone(),
                key: key.clone(),
            });
        }

        for (field_index, fk_field, target_name, target_store) in &references {
            let fk_value = &row.values[*field_index];
            if fk_value.is_null() || !target_store.contains_key(fk_value) {
                return Err(WarehouseError::DanglingReference {
                    entity: shape.name.clone(),
                    field: fk_field.to_string(),
                    references: target_name.to_string(),
                    key: fk_value.clone(),
                });
            }
        }

        validated.push(row);
    }

    Ok(validated)
}

/// Pairs each foreign key with its field position and the referenced store.
fn resolve_references<'a>(
    shape: &'a EntityShape,
    stores: &'a HashMap<String, RowStore>,
) -> Result<Vec<(usize, &'a str, &'a str, &'a RowStore)>> {
    shape
        .foreign_keys
        .iter()
        .map(|fk| {
            let index = shape.field_index(&fk.field).ok_or_else(|| WarehouseError::InvalidShape {
                entity: shape.name.clone(),
                reason: format!("foreign key field '{}' is not a field", fk.field),
            })?;
            let store = stores
                .get(&fk.references.to_ascii_lowercase())
                .ok_or_else(|| WarehouseError::NotFound(format!("entity '{}'", fk.references)))?;
            Ok((index, fk.field.as_str(), fk.references.as_str(), store))
        })
        .collect()
}

fn normalize_row(shape: &EntityShape, row_number: usize, row: Record) -> Result<Record> {
    let invalid = |reason: String| WarehouseError::InvalidRow {
        entity: shape.name.clone(),
        row: row_number,
        reason,
    };

    if row.len() != shape.arity() {
        return Err(invalid(format!(
            "expected {} values, got {}",
            shape.arity(),
            row.len()
        )));
    }

    let mut values = Vec::with_capacity(row.len());
    for (field, value) in shape.fields.iter().zip(row.values) {
        let shown = value.to_string();
        let value = field.field_type.coerce(value).ok_or_else(|| {
            invalid(format!("'{}' = {} does not fit {}", field.name, shown, field.field_type))
        })?;

        if value.is_null() && !field.nullable {
            return Err(invalid(format!("'{}' must not be null", field.name)));
        }

        if field.non_negative {
            if let Some(n) = value.as_decimal() {
                if n.is_sign_negative() && !n.is_zero() {
                    return Err(WarehouseError::ConstraintViolation {
                        entity: shape.name.clone(),
                        row: row_number,
                        reason: format!("'{}' = {} is negative", field.name, n),
                    });
                }
            }
        }

        values.push(value);
    }

    Ok(Record::new(values))
}
