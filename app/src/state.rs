//! FILENAME: app/src/state.rs
//! PURPOSE: Shared, thread-safe warehouse state and its operations.
//! CONTEXT: The catalog and the materialized cache sit behind separate
//! RwLocks. Locks are always taken catalog first, then cache. Loads hold the
//! catalog write lock for validate + append; aggregations compute under the
//! catalog read lock and take the cache write lock only to install a result.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use aggregate_engine::{
    aggregate, AggregateResult, AggregationSpec, JoinedSchema, MaterializedAggregate, MaterializedCache,
};
use engine::{Catalog, EntityShape, LoadSummary, Record, Value};
use persistence::{CsvOptions, SnapshotManifest, WarehouseSnapshot};

use crate::config::WarehouseConfig;
use crate::error::{AppError, AppResult};
use crate::{log_debug, log_enter, log_exit, log_info, log_warn};

pub struct WarehouseState {
    pub catalog: RwLock<Catalog>,
    pub views: RwLock<MaterializedCache>,
}

/// A state holding the standard sales star schema and no rows.
pub fn create_warehouse_state() -> AppResult<WarehouseState> {
    log_info!("LOAD", "Creating WarehouseState with the sales star schema");
    Ok(WarehouseState::new(Catalog::with_star_schema()?, MaterializedCache::new()))
}

fn poisoned<T>(what: &str) -> impl FnOnce(T) -> AppError + '_ {
    move |_| AppError::LockPoisoned(what.to_string())
}

impl WarehouseState {
    pub fn new(catalog: Catalog, views: MaterializedCache) -> Self {
        WarehouseState {
            catalog: RwLock::new(catalog),
            views: RwLock::new(views),
        }
    }

    pub fn from_snapshot(snapshot: WarehouseSnapshot) -> Self {
        Self::new(snapshot.catalog, snapshot.views)
    }

    fn read_catalog(&self) -> AppResult<RwLockReadGuard<'_, Catalog>> {
        self.catalog.read().map_err(poisoned("catalog"))
    }

    fn write_catalog(&self) -> AppResult<RwLockWriteGuard<'_, Catalog>> {
        self.catalog.write().map_err(poisoned("catalog"))
    }

    fn read_views(&self) -> AppResult<RwLockReadGuard<'_, MaterializedCache>> {
        self.views.read().map_err(poisoned("views"))
    }

    fn write_views(&self) -> AppResult<RwLockWriteGuard<'_, MaterializedCache>> {
        self.views.write().map_err(poisoned("views"))
    }

    // ========================================================================
    // CATALOG
    // ========================================================================

    /// Registers an entity shape. Returns false when an identical shape
    /// was already registered.
    pub fn register_entity(&self, shape: EntityShape) -> AppResult<bool> {
        let name = shape.name.clone();
        let created = self.write_catalog()?.register(shape)?;
        if created {
            log_info!("LOAD", "Registered entity '{}'", name);
        } else {
            log_debug!("LOAD", "Entity '{}' already registered with this shape", name);
        }
        Ok(created)
    }

    pub fn load_batch(&self, entity: &str, rows: Vec<Record>) -> AppResult<LoadSummary> {
        log_enter!("LOAD", "load_batch", "entity={} rows={}", entity, rows.len());
        let result = self.write_catalog()?.load_batch(entity, rows);
        match &result {
            Ok(summary) => log_info!(
                "LOAD",
                "Loaded {} rows into '{}' ({} total, version {})",
                summary.rows_loaded,
                summary.entity,
                summary.total_rows,
                summary.version
            ),
            Err(e) => log_warn!("LOAD", "Rejected batch for '{}': {}", entity, e),
        }
        log_exit!("LOAD", "load_batch");
        Ok(result?)
    }

    /// Parses a CSV file outside any lock, then loads it as one batch.
    pub fn load_csv(&self, entity: &str, path: &Path, options: &CsvOptions) -> AppResult<LoadSummary> {
        let shape = self.read_catalog()?.shape(entity)?.clone();
        let rows = persistence::read_batch_from_path(&shape, path, options).map_err(|e| {
            log_warn!("LOAD", "Failed to read {:?} for '{}': {}", path, entity, e);
            e
        })?;
        self.load_batch(entity, rows)
    }

    pub fn entity_shapes(&self) -> AppResult<Vec<EntityShape>> {
        Ok(self.read_catalog()?.registry().entities().cloned().collect())
    }

    /// Parses a filter literal as the type of the attribute it is compared to.
    pub fn parse_literal(&self, fact: &str, attribute: &str, text: &str, date_format: &str) -> AppResult<Value> {
        let catalog = self.read_catalog()?;
        let schema = JoinedSchema::resolve(&catalog, fact)?;
        let column = schema.resolve_attribute(attribute)?;
        let field_type = schema
            .column(column)
            .map(|c| c.field_type)
            .ok_or_else(|| AppError::InvalidArgument(attribute.to_string()))?;
        field_type
            .parse(text, date_format)
            .map_err(|reason| AppError::InvalidArgument(format!("{}: {}", attribute, reason)))
    }

    // ========================================================================
    // AGGREGATION
    // ========================================================================

    pub fn aggregate(&self, spec: &AggregationSpec) -> AppResult<AggregateResult> {
        log_enter!("QUERY", "aggregate", "measure={}", spec.measure.label());
        let catalog = self.read_catalog()?;
        let result = aggregate(&catalog, spec);
        match &result {
            Ok(r) => log_exit!("QUERY", "aggregate", "rows={}", r.len()),
            Err(e) => log_warn!("QUERY", "Aggregation failed: {}", e),
        }
        Ok(result?)
    }

    // ========================================================================
    // MATERIALIZED VIEWS
    // ========================================================================

    pub fn materialize(&self, name: &str, spec: AggregationSpec) -> AppResult<Arc<MaterializedAggregate>> {
        let catalog = self.read_catalog()?;
        if self.read_views()?.contains(name) {
            return Err(engine::WarehouseError::NameConflict(name.to_string()).into());
        }

        let entry = MaterializedAggregate::compute(name, spec, &catalog)?;
        let installed = self.write_views()?.insert(entry)?;
        log_info!(
            "VIEW",
            "Materialized '{}' with {} rows at version {}",
            name,
            installed.result.len(),
            installed.source_version
        );
        Ok(installed)
    }

    /// Serves the cached snapshot; never recomputes.
    pub fn read_view(&self, name: &str) -> AppResult<Arc<MaterializedAggregate>> {
        Ok(self.read_views()?.read(name)?)
    }

    pub fn refresh_view(&self, name: &str) -> AppResult<Arc<MaterializedAggregate>> {
        let catalog = self.read_catalog()?;
        let prepared = self.read_views()?.prepare_refresh(name, &catalog)?;
        let refreshed = self.write_views()?.commit_refresh(prepared)?;
        log_info!(
            "VIEW",
            "Refreshed '{}' ({} rows, version {}, refresh #{})",
            name,
            refreshed.result.len(),
            refreshed.source_version,
            refreshed.refresh_count
        );
        Ok(refreshed)
    }

    pub fn drop_view(&self, name: &str) -> AppResult<()> {
        self.write_views()?.drop_view(name)?;
        log_info!("VIEW", "Dropped '{}'", name);
        Ok(())
    }

    pub fn view_names(&self) -> AppResult<Vec<String>> {
        Ok(self.read_views()?.names())
    }

    /// True when loads have happened since the view was last computed.
    pub fn view_is_stale(&self, name: &str) -> AppResult<bool> {
        let catalog = self.read_catalog()?;
        let stale = self.read_views()?.is_stale(name, &catalog)?;
        Ok(stale)
    }

    /// Every view with whether loads happened since its snapshot.
    pub fn view_status(&self) -> AppResult<Vec<(Arc<MaterializedAggregate>, bool)>> {
        let catalog = self.read_catalog()?;
        let views = self.read_views()?;
        Ok(views
            .entries()
            .into_iter()
            .map(|entry| {
                let stale = entry.is_stale(&catalog);
                (entry, stale)
            })
            .collect())
    }

    // ========================================================================
    // SNAPSHOTS & CONFIG
    // ========================================================================

    pub fn save_snapshot(&self, path: &Path) -> AppResult<SnapshotManifest> {
        let catalog = self.read_catalog()?;
        let views = self.read_views()?;
        let manifest = persistence::save_snapshot(path, &catalog, &views)?;
        log_info!(
            "SNAPSHOT",
            "Saved {:?} ({} entities, {} views, version {})",
            path,
            manifest.entities.len(),
            views.len(),
            manifest.catalog_version
        );
        Ok(manifest)
    }

    pub fn open_snapshot(path: &Path) -> AppResult<Self> {
        let snapshot = persistence::load_snapshot(path)?;
        log_info!(
            "SNAPSHOT",
            "Opened {:?} (version {}, saved {})",
            path,
            snapshot.manifest.catalog_version,
            snapshot.manifest.saved_at
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Loads every configured source in order, then materializes the
    /// configured views. A view that already exists is refreshed instead.
    pub fn apply_config(&self, config: &WarehouseConfig) -> AppResult<Vec<LoadSummary>> {
        let mut summaries = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            summaries.push(self.load_csv(&source.entity, &source.path, &config.csv)?);
        }
        for view in &config.views {
            if self.read_views()?.contains(&view.name) {
                self.refresh_view(&view.name)?;
            } else {
                self.materialize(&view.name, view.spec.clone())?;
            }
        }
        Ok(summaries)
    }
}
