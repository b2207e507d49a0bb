//! FILENAME: core/engine/src/catalog.rs
//! PURPOSE: The catalog - schema registry plus one row store per entity.
//! CONTEXT: Every mutation goes through `load_batch`, which validates the whole
//! batch before appending. `version` counts committed batches so derived
//! snapshots can tell whether they are behind the stores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WarehouseError};
use crate::loader::validate_batch;
use crate::schema::{EntityKind, EntityShape, SchemaRegistry};
use crate::store::{Record, RowStore};
use crate::value::Value;

/// Outcome of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub entity: String,
    pub rows_loaded: usize,
    pub total_rows: usize,
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    registry: SchemaRegistry,
    /// Keyed by lower-cased entity name.
    stores: HashMap<String, RowStore>,
    version: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the standard sales star schema registered.
    pub fn with_star_schema() -> Result<Self> {
        let mut catalog = Catalog::new();
        catalog.register_star_schema()?;
        Ok(catalog)
    }

    /// Registers the four standard entities, dimensions first. Shapes that
    /// are already registered identically are left alone.
    pub fn register_star_schema(&mut self) -> Result<()> {
        for shape in crate::star::star_schema() {
            self.register(shape)?;
        }
        Ok(())
    }

    /// Registers a shape and creates its (empty) store.
    pub fn register(&mut self, shape: EntityShape) -> Result<bool> {
        let key_position = shape.primary_key_index();
        let name = shape.name.to_ascii_lowercase();
        let created = self.registry.register_shape(shape)?;
        if created {
            if let Some(position) = key_position {
                self.stores.insert(name, RowStore::new(position));
            }
        }
        Ok(created)
    }

    /// Validates and appends a batch as one unit.
    /// On any error the stores and version are left untouched.
    pub fn load_batch(&mut self, entity: &str, rows: Vec<Record>) -> Result<LoadSummary> {
        let shape = self.registry.get(entity)?;
        let key = shape.name.to_ascii_lowercase();
        let target = self
            .stores
            .get(&key)
            .ok_or_else(|| WarehouseError::NotFound(format!("store for '{}'", entity)))?;

        let validated = validate_batch(shape, target, &self.stores, rows)?;
        let rows_loaded = validated.len();
        let entity_name = shape.name.clone();

        let store = self
            .stores
            .get_mut(&key)
            .ok_or_else(|| WarehouseError::NotFound(format!("store for '{}'", entity)))?;
        if rows_loaded > 0 {
            store.append(validated);
            self.version += 1;
        }

        Ok(LoadSummary {
            entity: entity_name,
            rows_loaded,
            total_rows: store.len(),
            version: self.version,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn shape(&self, entity: &str) -> Result<&EntityShape> {
        self.registry.get(entity)
    }

    pub fn store(&self, entity: &str) -> Result<&RowStore> {
        self.stores
            .get(&entity.to_ascii_lowercase())
            .ok_or_else(|| WarehouseError::NotFound(format!("entity '{}'", entity)))
    }

    /// Number of committed, non-empty batches.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Raises the version counter to at least `version`.
    /// Used after replaying a saved catalog so that snapshots taken before
    /// the save still compare against the version they were computed from.
    pub fn resume_version(&mut self, version: u64) {
        self.version = self.version.max(version);
    }

    /// Re-checks referential integrity of every fact row.
    pub fn check_integrity(&self) -> Result<()> {
        for shape in self.registry.entities() {
            if shape.kind() != EntityKind::Fact {
                continue;
            }
            let store = self.store(&shape.name)?;
            for fk in &shape.foreign_keys {
                let index = shape.field_index(&fk.field).ok_or_else(|| {
                    WarehouseError::UnknownAttribute(format!("{}.{}", shape.name, fk.field))
                })?;
                let target = self.store(&fk.references)?;
                for record in store.iter() {
                    let key = record.get(index).cloned().unwrap_or(Value::Null);
                    if !target.contains_key(&key) {
                        return Err(WarehouseError::DanglingReference {
                            entity: shape.name.clone(),
                            field: fk.field.clone(),
                            references: fk.references.clone(),
                            key,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
