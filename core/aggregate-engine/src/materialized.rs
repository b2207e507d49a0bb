//! FILENAME: core/aggregate-engine/src/materialized.rs
//! Materialized Cache - named aggregation snapshots refreshed on request.
//!
//! A materialized aggregate is computed once and then served unchanged until
//! an explicit refresh, even when the underlying stores have grown since.
//! Entries are held behind `Arc` so a reader keeps a consistent snapshot
//! while a refresh installs its replacement.
//!
//! Refresh is split in two phases:
//! - `prepare_refresh` only reads (the catalog and the cached spec)
//! - `commit_refresh` swaps the new snapshot in
//! which lets a caller compute under a read lock and hold a write lock only
//! for the swap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use engine::{Catalog, Result, WarehouseError};

use crate::definition::AggregationSpec;
use crate::engine::aggregate;
use crate::view::AggregateResult;

// ============================================================================
// ENTRY
// ============================================================================

/// One named, cached aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedAggregate {
    pub name: String,
    pub spec: AggregationSpec,
    pub result: AggregateResult,
    /// When `result` was computed.
    pub refreshed_at: DateTime<Utc>,
    /// Catalog version the result was computed from.
    pub source_version: u64,
    /// Number of refreshes since materialization.
    #[serde(default)]
    pub refresh_count: u64,
}

impl MaterializedAggregate {
    /// Computes a fresh entry from the catalog's current contents.
    pub fn compute(name: impl Into<String>, spec: AggregationSpec, catalog: &Catalog) -> Result<Self> {
        let result = aggregate(catalog, &spec)?;
        Ok(MaterializedAggregate {
            name: name.into(),
            spec,
            result,
            refreshed_at: Utc::now(),
            source_version: catalog.version(),
            refresh_count: 0,
        })
    }

    /// True when loads have happened since the snapshot was taken.
    pub fn is_stale(&self, catalog: &Catalog) -> bool {
        self.source_version != catalog.version()
    }
}

/// A recomputed result waiting to be committed.
#[derive(Debug, Clone)]
pub struct PreparedRefresh {
    pub name: String,
    spec: AggregationSpec,
    result: AggregateResult,
    refreshed_at: DateTime<Utc>,
    source_version: u64,
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Default)]
pub struct MaterializedCache {
    views: FxHashMap<String, Arc<MaterializedAggregate>>,
}

impl MaterializedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    /// Computes and stores a new named aggregate.
    /// A failed computation leaves the cache unchanged.
    pub fn materialize(
        &mut self,
        name: &str,
        spec: AggregationSpec,
        catalog: &Catalog,
    ) -> Result<Arc<MaterializedAggregate>> {
        if self.contains(name) {
            return Err(WarehouseError::NameConflict(name.to_string()));
        }
        let entry = MaterializedAggregate::compute(name, spec, catalog)?;
        self.insert(entry)
    }

    /// Installs an already computed entry under its name.
    pub fn insert(&mut self, entry: MaterializedAggregate) -> Result<Arc<MaterializedAggregate>> {
        if self.contains(&entry.name) {
            return Err(WarehouseError::NameConflict(entry.name));
        }
        let entry = Arc::new(entry);
        self.views.insert(entry.name.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    /// Returns the last computed snapshot, however stale.
    pub fn read(&self, name: &str) -> Result<Arc<MaterializedAggregate>> {
        self.views
            .get(name)
            .cloned()
            .ok_or_else(|| WarehouseError::NotFound(format!("materialized view '{}'", name)))
    }

    /// Phase one of a refresh: recompute from current stores without
    /// touching the cache.
    pub fn prepare_refresh(&self, name: &str, catalog: &Catalog) -> Result<PreparedRefresh> {
        let current = self.read(name)?;
        let result = aggregate(catalog, &current.spec)?;
        Ok(PreparedRefresh {
            name: name.to_string(),
            spec: current.spec.clone(),
            result,
            refreshed_at: Utc::now(),
            source_version: catalog.version(),
        })
    }

    /// Phase two of a refresh: swap the prepared snapshot in.
    /// Fails with `NotFound` when the view was dropped in between, or was
    /// dropped and re-created with a different spec. Fails with
    /// `StaleRefresh` when the cached entry was computed from a newer
    /// catalog version than the prepared one.
    pub fn commit_refresh(&mut self, prepared: PreparedRefresh) -> Result<Arc<MaterializedAggregate>> {
        let slot = self
            .views
            .get_mut(&prepared.name)
            .filter(|current| current.spec == prepared.spec)
            .ok_or_else(|| WarehouseError::NotFound(format!("materialized view '{}'", prepared.name)))?;
        if prepared.source_version < slot.source_version {
            return Err(WarehouseError::StaleRefresh {
                name: prepared.name,
                prepared: prepared.source_version,
                cached: slot.source_version,
            });
        }

        let refreshed = Arc::new(MaterializedAggregate {
            name: prepared.name,
            spec: prepared.spec,
            result: prepared.result,
            refreshed_at: prepared.refreshed_at,
            source_version: prepared.source_version,
            refresh_count: slot.refresh_count + 1,
        });
        *slot = Arc::clone(&refreshed);
        Ok(refreshed)
    }

    /// Recomputes and replaces a view in one step.
    pub fn refresh(&mut self, name: &str, catalog: &Catalog) -> Result<Arc<MaterializedAggregate>> {
        let prepared = self.prepare_refresh(name, catalog)?;
        self.commit_refresh(prepared)
    }

    /// Removes a view. Snapshots already handed out stay valid.
    pub fn drop_view(&mut self, name: &str) -> Result<Arc<MaterializedAggregate>> {
        self.views
            .remove(name)
            .ok_or_else(|| WarehouseError::NotFound(format!("materialized view '{}'", name)))
    }

    /// View names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_stale(&self, name: &str, catalog: &Catalog) -> Result<bool> {
        Ok(self.read(name)?.is_stale(catalog))
    }

    /// All entries, sorted by name.
    pub fn entries(&self) -> Vec<Arc<MaterializedAggregate>> {
        let mut entries: Vec<Arc<MaterializedAggregate>> = self.views.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Rebuilds a cache from stored entries, as saved, without recomputing.
    pub fn restore(entries: Vec<MaterializedAggregate>) -> Result<Self> {
        let mut cache = MaterializedCache::new();
        for entry in entries {
            cache.insert(entry)?;
        }
        Ok(cache)
    }
}
