//! FILENAME: core/persistence/src/snapshot.rs
//! Warehouse snapshot file - ZIP-based structured JSON.
//!
//! Layout:
//!   manifest.json            format version, catalog version, entity order
//!   schema.json              registered shapes in registration order
//!   entities/<name>.json     rows of one entity
//!   views.json               materialized aggregates with their results
//!
//! Loading replays every entity through the catalog's loader, so a tampered
//! file cannot produce a catalog with dangling references. Materialized views
//! come back exactly as saved and are not recomputed.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use aggregate_engine::{MaterializedAggregate, MaterializedCache};
use chrono::{DateTime, Utc};
use engine::{Catalog, EntityShape, Record};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::PersistenceError;

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_PATH: &str = "manifest.json";
const SCHEMA_PATH: &str = "schema.json";
const VIEWS_PATH: &str = "views.json";

// ============================================================================
// DOCUMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub catalog_version: u64,
    pub saved_at: DateTime<Utc>,
    /// Entity names in registration order.
    pub entities: Vec<String>,
}

/// Everything restored from one snapshot file.
#[derive(Debug)]
pub struct WarehouseSnapshot {
    pub manifest: SnapshotManifest,
    pub catalog: Catalog,
    pub views: MaterializedCache,
}

fn entity_path(name: &str) -> String {
    format!("entities/{}.json", name)
}

// ============================================================================
// SAVE
// ============================================================================

/// Writes a snapshot to any seekable sink.
pub fn write_snapshot<W: Write + Seek>(
    sink: W,
    catalog: &Catalog,
    views: &MaterializedCache,
) -> Result<SnapshotManifest, PersistenceError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(sink);

    let shapes: Vec<&EntityShape> = catalog.registry().entities().collect();
    let manifest = SnapshotManifest {
        format_version: FORMAT_VERSION,
        catalog_version: catalog.version(),
        saved_at: Utc::now(),
        entities: shapes.iter().map(|s| s.name.clone()).collect(),
    };

    zip.start_file(MANIFEST_PATH, options)?;
    serde_json::to_writer_pretty(&mut zip, &manifest)?;

    zip.start_file(SCHEMA_PATH, options)?;
    serde_json::to_writer_pretty(&mut zip, &shapes)?;

    for shape in &shapes {
        let rows = catalog.store(&shape.name)?.records();
        zip.start_file(entity_path(&shape.name), options)?;
        serde_json::to_writer(&mut zip, rows)?;
    }

    let entries: Vec<MaterializedAggregate> = views.entries().iter().map(|e| e.as_ref().clone()).collect();
    zip.start_file(VIEWS_PATH, options)?;
    serde_json::to_writer(&mut zip, &entries)?;

    zip.finish()?;
    Ok(manifest)
}

/// Saves a snapshot to `path`, replacing any previous file only once the
/// new one is completely written.
pub fn save_snapshot(
    path: &Path,
    catalog: &Catalog,
    views: &MaterializedCache,
) -> Result<SnapshotManifest, PersistenceError> {
    let partial = path.with_extension("partial");
    let manifest = {
        let file = File::create(&partial)?;
        let mut writer = BufWriter::new(file);
        let manifest = write_snapshot(&mut writer, catalog, views)?;
        writer.flush()?;
        manifest
    };
    fs::rename(&partial, path)?;
    Ok(manifest)
}

// ============================================================================
// LOAD
// ============================================================================

fn read_json<R: Read + Seek, T: serde::de::DeserializeOwned>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<T, PersistenceError> {
    let entry = archive
        .by_name(name)
        .map_err(|_| PersistenceError::InvalidFormat(format!("snapshot is missing {}", name)))?;
    Ok(serde_json::from_reader(entry)?)
}

/// Reads a snapshot from any seekable source.
pub fn read_snapshot<R: Read + Seek>(source: R) -> Result<WarehouseSnapshot, PersistenceError> {
    let mut archive = ZipArchive::new(source)?;

    let manifest: SnapshotManifest = read_json(&mut archive, MANIFEST_PATH)?;
    if manifest.format_version > FORMAT_VERSION {
        return Err(PersistenceError::InvalidFormat(format!(
            "snapshot format {} is newer than supported format {}",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    let shapes: Vec<EntityShape> = read_json(&mut archive, SCHEMA_PATH)?;
    let mut catalog = Catalog::new();
    let mut names = Vec::with_capacity(shapes.len());
    for shape in shapes {
        names.push(shape.name.clone());
        catalog.register(shape)?;
    }

    for name in &names {
        let rows: Vec<Record> = read_json(&mut archive, &entity_path(name))?;
        catalog.load_batch(name, rows)?;
    }
    catalog.resume_version(manifest.catalog_version);

    let entries: Vec<MaterializedAggregate> = read_json(&mut archive, VIEWS_PATH)?;
    let views = MaterializedCache::restore(entries)?;

    Ok(WarehouseSnapshot {
        manifest,
        catalog,
        views,
    })
}

/// Opens the snapshot saved at `path`.
pub fn load_snapshot(path: &Path) -> Result<WarehouseSnapshot, PersistenceError> {
    let file = File::open(path)?;
    read_snapshot(BufReader::new(file))
}
