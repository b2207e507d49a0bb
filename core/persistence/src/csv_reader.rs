//! FILENAME: core/persistence/src/csv_reader.rs
//! Reads a CSV file into a batch of typed records for one entity.
//!
//! The header row names the columns; they are matched to the entity's fields
//! case-insensitively and in any order. Every field needs exactly one column.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use engine::{EntityShape, Record, DEFAULT_DATE_FORMAT};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Parsing options shared by every CSV source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    /// chrono format string for DATE fields.
    pub date_format: String,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: ',',
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

/// Reads every record of a CSV document. Nothing is loaded here; the
/// returned batch still goes through the loader's checks.
pub fn read_batch<R: Read>(
    shape: &EntityShape,
    source: R,
    options: &CsvOptions,
) -> Result<Vec<Record>, PersistenceError> {
    if !options.delimiter.is_ascii() {
        return Err(PersistenceError::InvalidFormat(format!(
            "delimiter '{}' is not a single-byte character",
            options.delimiter
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter as u8)
        .has_headers(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let columns = map_columns(shape, &headers)?;

    let mut batch = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result?;
        // Header is line 1; fall back to counting when positions are absent
        let line = row.position().map_or(index as u64 + 2, |p| p.line());

        let mut values = Vec::with_capacity(shape.arity());
        for (field, &column) in shape.fields.iter().zip(&columns) {
            let cell = row.get(column).unwrap_or("");
            let value = field
                .field_type
                .parse(cell, &options.date_format)
                .map_err(|reason| PersistenceError::InvalidCsv {
                    line,
                    column: headers.get(column).unwrap_or(&field.name).to_string(),
                    reason,
                })?;
            values.push(value);
        }
        batch.push(Record::new(values));
    }

    Ok(batch)
}

/// Opens `path` and reads it with [`read_batch`].
pub fn read_batch_from_path(
    shape: &EntityShape,
    path: &Path,
    options: &CsvOptions,
) -> Result<Vec<Record>, PersistenceError> {
    let file = File::open(path)?;
    read_batch(shape, file, options)
}

/// For each field of `shape`, the header column that holds it.
fn map_columns(shape: &EntityShape, headers: &csv::StringRecord) -> Result<Vec<usize>, PersistenceError> {
    let mut columns: Vec<Option<usize>> = vec![None; shape.arity()];

    for (column, header) in headers.iter().enumerate() {
        let header = header.trim();
        let field = shape.field_index(header).ok_or_else(|| PersistenceError::InvalidCsv {
            line: 1,
            column: header.to_string(),
            reason: format!("unknown column for '{}'", shape.name),
        })?;
        if columns[field].is_some() {
            return Err(PersistenceError::InvalidCsv {
                line: 1,
                column: header.to_string(),
                reason: "column appears more than once".to_string(),
            });
        }
        columns[field] = Some(column);
    }

    shape
        .fields
        .iter()
        .zip(columns)
        .map(|(field, column)| {
            column.ok_or_else(|| PersistenceError::InvalidCsv {
                line: 1,
                column: field.name.clone(),
                reason: format!("missing column for '{}'", shape.name),
            })
        })
        .collect()
}
