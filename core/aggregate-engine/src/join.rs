//! FILENAME: core/aggregate-engine/src/join.rs
//! Join View - a fact entity joined to every dimension it references.
//!
//! The joined attribute namespace is the fact's fields followed by each
//! referenced dimension's fields, in foreign key order. Attributes are
//! addressed as `entity.field`, or by a bare `field` name when it is unique.

use engine::{Catalog, FieldType, Record, Result, RowStore, Value, WarehouseError};

static NULL_VALUE: Value = Value::Null;

/// One attribute of the joined schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedColumn {
    pub entity: String,
    pub field: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl JoinedColumn {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity, self.field)
    }
}

#[derive(Debug, Clone)]
struct DimensionJoin {
    /// Position of the foreign key within the fact row.
    fk_position: usize,
    entity: String,
    arity: usize,
}

/// The attribute namespace of a fact joined to its dimensions.
#[derive(Debug, Clone)]
pub struct JoinedSchema {
    pub fact: String,
    columns: Vec<JoinedColumn>,
    joins: Vec<DimensionJoin>,
}

impl JoinedSchema {
    /// Builds the joined schema of `fact` from the catalog's registry.
    pub fn resolve(catalog: &Catalog, fact: &str) -> Result<Self> {
        let fact_shape = catalog.shape(fact)?;
        let mut columns: Vec<JoinedColumn> = fact_shape
            .fields
            .iter()
            .map(|f| JoinedColumn {
                entity: fact_shape.name.clone(),
                field: f.name.clone(),
                field_type: f.field_type,
                nullable: f.nullable,
            })
            .collect();

        let mut joins = Vec::with_capacity(fact_shape.foreign_keys.len());
        for fk in &fact_shape.foreign_keys {
            let fk_position = fact_shape
                .field_index(&fk.field)
                .ok_or_else(|| WarehouseError::UnknownAttribute(format!("{}.{}", fact_shape.name, fk.field)))?;
            let dimension = catalog.shape(&fk.references)?;
            columns.extend(dimension.fields.iter().map(|f| JoinedColumn {
                entity: dimension.name.clone(),
                field: f.name.clone(),
                field_type: f.field_type,
                nullable: f.nullable,
            }));
            joins.push(DimensionJoin {
                fk_position,
                entity: dimension.name.clone(),
                arity: dimension.arity(),
            });
        }

        Ok(JoinedSchema {
            fact: fact_shape.name.clone(),
            columns,
            joins,
        })
    }

    pub fn columns(&self) -> &[JoinedColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&JoinedColumn> {
        self.columns.get(index)
    }

    /// Resolves an attribute name to its column position.
    /// Qualified names must match exactly (ASCII case-insensitive); a bare
    /// name must match exactly one column.
    pub fn resolve_attribute(&self, name: &str) -> Result<usize> {
        if let Some((entity, field)) = name.split_once('.') {
            return self
                .columns
                .iter()
                .position(|c| c.entity.eq_ignore_ascii_case(entity) && c.field.eq_ignore_ascii_case(field))
                .ok_or_else(|| WarehouseError::UnknownAttribute(name.to_string()));
        }

        let matches: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.field.eq_ignore_ascii_case(name))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [single] => Ok(*single),
            [] => Err(WarehouseError::UnknownAttribute(name.to_string())),
            many => {
                let candidates: Vec<String> = many
                    .iter()
                    .map(|&i| self.columns[i].qualified_name())
                    .collect();
                Err(WarehouseError::UnknownAttribute(format!(
                    "{} (ambiguous: {})",
                    name,
                    candidates.join(", ")
                )))
            }
        }
    }

    /// Binds the schema to the catalog's stores for scanning.
    pub fn bind<'a>(&'a self, catalog: &'a Catalog) -> Result<JoinView<'a>> {
        let fact_store = catalog.store(&self.fact)?;
        let dimension_stores = self
            .joins
            .iter()
            .map(|j| catalog.store(&j.entity))
            .collect::<Result<Vec<_>>>()?;
        Ok(JoinView {
            schema: self,
            fact_store,
            dimension_stores,
        })
    }
}

/// A joined schema bound to live stores.
pub struct JoinView<'a> {
    schema: &'a JoinedSchema,
    fact_store: &'a RowStore,
    dimension_stores: Vec<&'a RowStore>,
}

impl<'a> JoinView<'a> {
    /// Joined rows in fact insertion order. A reference that does not resolve
    /// (impossible while the loader's integrity checks hold) joins as nulls.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&'a Value>> + '_ {
        self.fact_store.iter().map(move |fact| self.join(fact))
    }

    fn join(&self, fact: &'a Record) -> Vec<&'a Value> {
        let mut row: Vec<&'a Value> = Vec::with_capacity(self.schema.columns.len());
        row.extend(fact.values.iter());

        for (join, &store) in self.schema.joins.iter().zip(self.dimension_stores.iter()) {
            let key = fact.get(join.fk_position).unwrap_or(&NULL_VALUE);
            match store.get_by_key(key) {
                Some(dimension) => row.extend(dimension.values.iter()),
                None => row.extend(std::iter::repeat(&NULL_VALUE).take(join.arity)),
            }
        }

        row
    }
}
