//! FILENAME: core/engine/src/schema.rs
//! PURPOSE: Schema Registry - declares entity shapes and their foreign keys.
//! CONTEXT: Shapes are registered once and are read-only afterwards.
//! Registration order is preserved so that dependent entities (facts) always
//! come after the dimensions they reference.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WarehouseError};
use crate::value::FieldType;

// ============================================================================
// FIELD DEFINITIONS
// ============================================================================

/// A single declared field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Whether the field may hold Null.
    #[serde(default)]
    pub nullable: bool,
    /// Numeric fields only: reject negative values on load.
    #[serde(default)]
    pub non_negative: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            nullable: false,
            non_negative: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }
}

/// A reference from a field of this entity to another entity's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub field: String,
    pub references: String,
}

impl ForeignKey {
    pub fn new(field: impl Into<String>, references: impl Into<String>) -> Self {
        ForeignKey {
            field: field.into(),
            references: references.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Dimension,
    Fact,
}

// ============================================================================
// ENTITY SHAPE
// ============================================================================

/// The registered shape of one entity (a dimension or a fact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityShape {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub primary_key: String,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl EntityShape {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldDef>,
        primary_key: impl Into<String>,
        foreign_keys: Vec<ForeignKey>,
    ) -> Self {
        EntityShape {
            name: name.into(),
            fields,
            primary_key: primary_key.into(),
            foreign_keys,
        }
    }

    /// Entities that reference others are facts.
    pub fn kind(&self) -> EntityKind {
        if self.foreign_keys.is_empty() {
            EntityKind::Dimension
        } else {
            EntityKind::Fact
        }
    }

    /// Case-insensitive field lookup.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.field_index(&self.primary_key)
    }

    pub fn primary_key_type(&self) -> Option<FieldType> {
        self.field(&self.primary_key).map(|f| f.field_type)
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    fn invalid(&self, reason: impl Into<String>) -> WarehouseError {
        WarehouseError::InvalidShape {
            entity: self.name.clone(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Holds every registered entity shape.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: Vec<EntityShape>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity shape from its parts.
    pub fn register(
        &mut self,
        name: &str,
        fields: Vec<FieldDef>,
        primary_key: &str,
        foreign_keys: Vec<ForeignKey>,
    ) -> Result<bool> {
        self.register_shape(EntityShape::new(name, fields, primary_key, foreign_keys))
    }

    /// Registers a shape. Returns false if an identical shape was already
    /// registered under the same name (idempotent re-registration).
    pub fn register_shape(&mut self, shape: EntityShape) -> Result<bool> {
        if let Some(existing) = self.lookup(&shape.name) {
            if *existing == shape {
                return Ok(false);
            }
            let reason = match (existing.primary_key_type(), shape.primary_key_type()) {
                (Some(old), Some(new)) if old != new => {
                    format!("primary key type {} conflicts with registered {}", new, old)
                }
                _ => "shape differs from the registered one".to_string(),
            };
            return Err(WarehouseError::DuplicateEntity {
                entity: existing.name.clone(),
                reason,
            });
        }

        self.validate(&shape)?;

        self.by_name
            .insert(shape.name.to_ascii_lowercase(), self.entities.len());
        self.entities.push(shape);
        Ok(true)
    }

    fn validate(&self, shape: &EntityShape) -> Result<()> {
        if shape.name.trim().is_empty() {
            return Err(shape.invalid("entity name is empty"));
        }
        if shape.fields.is_empty() {
            return Err(shape.invalid("no fields declared"));
        }

        for (i, field) in shape.fields.iter().enumerate() {
            if field.name.contains('.') || field.name.trim().is_empty() {
                return Err(shape.invalid(format!("invalid field name '{}'", field.name)));
            }
            if shape.field_index(&field.name) != Some(i) {
                return Err(shape.invalid(format!("field '{}' declared twice", field.name)));
            }
            if field.non_negative && !field.field_type.is_numeric() {
                return Err(shape.invalid(format!(
                    "non-negative constraint on non-numeric field '{}'",
                    field.name
                )));
            }
        }

        let pk = shape
            .field(&shape.primary_key)
            .ok_or_else(|| shape.invalid(format!("primary key '{}' is not a field", shape.primary_key)))?;
        if pk.nullable {
            return Err(shape.invalid("primary key must not be nullable"));
        }

        for fk in &shape.foreign_keys {
            let field = shape
                .field(&fk.field)
                .ok_or_else(|| shape.invalid(format!("foreign key field '{}' is not a field", fk.field)))?;
            if fk.references.eq_ignore_ascii_case(&shape.name) {
                return Err(shape.invalid(format!("'{}' references its own entity", fk.field)));
            }
            let target = self
                .lookup(&fk.references)
                .ok_or_else(|| shape.invalid(format!("'{}' references unregistered entity '{}'", fk.field, fk.references)))?;
            if target.primary_key_type() != Some(field.field_type) {
                return Err(shape.invalid(format!(
                    "'{}' is {} but '{}' keys are {}",
                    fk.field,
                    field.field_type,
                    target.name,
                    target
                        .primary_key_type()
                        .map(|t| t.to_string())
                        .unwrap_or_default()
                )));
            }
        }

        let mut fk_fields: Vec<String> = shape
            .foreign_keys
            .iter()
            .map(|fk| fk.field.to_ascii_lowercase())
            .collect();
        fk_fields.sort();
        if fk_fields.windows(2).any(|w| w[0] == w[1]) {
            return Err(shape.invalid("a field carries more than one foreign key"));
        }

        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&EntityShape> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.entities[i])
    }

    /// Returns the shape registered under `name`.
    pub fn get(&self, name: &str) -> Result<&EntityShape> {
        self.lookup(name)
            .ok_or_else(|| WarehouseError::NotFound(format!("entity '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Shapes in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityShape> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city_dimension() -> Vec<FieldDef> {
        vec![
            FieldDef::new("segment_id", FieldType::Integer),
            FieldDef::new("city", FieldType::Text).nullable(),
        ]
    }

    #[test]
    fn registers_dimension_and_fact() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.register("segments", city_dimension(), "segment_id", vec![]).unwrap());
        assert!(registry
            .register(
                "visits",
                vec![
                    FieldDef::new("visit_id", FieldType::Text),
                    FieldDef::new("segment_id", FieldType::Integer),
                ],
                "visit_id",
                vec![ForeignKey::new("segment_id", "segments")],
            )
            .unwrap());

        assert_eq!(registry.get("segments").unwrap().kind(), EntityKind::Dimension);
        assert_eq!(registry.get("VISITS").unwrap().kind(), EntityKind::Fact);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn identical_reregistration_is_a_no_op() {
        let mut registry = SchemaRegistry::new();
        registry.register("segments", city_dimension(), "segment_id", vec![]).unwrap();
        assert!(!registry.register("segments", city_dimension(), "segment_id", vec![]).unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_key_type_is_duplicate_entity() {
        let mut registry = SchemaRegistry::new();
        registry.register("segments", city_dimension(), "segment_id", vec![]).unwrap();

        let err = registry
            .register(
                "segments",
                vec![
                    FieldDef::new("segment_id", FieldType::Text),
                    FieldDef::new("city", FieldType::Text).nullable(),
                ],
                "segment_id",
                vec![],
            )
            .unwrap_err();

        match err {
            WarehouseError::DuplicateEntity { entity, reason } => {
                assert_eq!(entity, "segments");
                assert!(reason.contains("TEXT"));
            }
            other => panic!("Expected DuplicateEntity, got {:?}", other),
        }
    }

    #[test]
    fn rejects_foreign_key_type_mismatch() {
        let mut registry = SchemaRegistry::new();
        registry.register("segments", city_dimension(), "segment_id", vec![]).unwrap();

        let err = registry
            .register(
                "visits",
                vec![
                    FieldDef::new("visit_id", FieldType::Text),
                    FieldDef::new("segment_id", FieldType::Text),
                ],
                "visit_id",
                vec![ForeignKey::new("segment_id", "segments")],
            )
            .unwrap_err();
        assert!(matches!(err, WarehouseError::InvalidShape { .. }));
    }

    #[test]
    fn rejects_unregistered_reference_and_missing_key() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register(
                "visits",
                vec![FieldDef::new("segment_id", FieldType::Integer)],
                "segment_id",
                vec![ForeignKey::new("segment_id", "segments")],
            )
            .unwrap_err();
        assert!(matches!(err, WarehouseError::InvalidShape { .. }));

        let err = registry
            .register("segments", city_dimension(), "id", vec![])
            .unwrap_err();
        assert!(matches!(err, WarehouseError::InvalidShape { .. }));
        assert!(registry.is_empty());
    }
}
