//! FILENAME: app/src/api_types.rs
// PURPOSE: Response types for command output, as JSON or as text tables.
// CONTEXT: All structs use camelCase serialization.

use aggregate_engine::{AggregateResult, GroupValue, MaterializedAggregate};
use chrono::{DateTime, Utc};
use engine::{LoadSummary, Value};
use serde::{Deserialize, Serialize};

/// Text used for an aggregated-away attribute.
pub const TOTAL_MARKER: &str = "*";

/// Text used for a null value or measure.
pub const NULL_TEXT: &str = "NULL";

// ============================================================================
// AGGREGATE RESULTS
// ============================================================================

/// One result row. `values[i]` is null when either the data was null or the
/// attribute was rolled up; `totals[i]` tells the two apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRowData {
    pub values: Vec<serde_json::Value>,
    pub totals: Vec<bool>,
    pub grouping_id: u64,
    /// Decimal rendered as text to keep it exact; None for a null aggregate.
    pub measure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub attributes: Vec<String>,
    pub measure: String,
    pub rows: Vec<AggregateRowData>,
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Decimal(d) => serde_json::Value::String(d.to_string()),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Date(_) => serde_json::Value::String(value.to_string()),
    }
}

impl From<&AggregateResult> for AggregateResponse {
    fn from(result: &AggregateResult) -> Self {
        let rows = result
            .rows
            .iter()
            .map(|row| AggregateRowData {
                values: row
                    .key
                    .iter()
                    .map(|g| g.as_value().map_or(serde_json::Value::Null, value_to_json))
                    .collect(),
                totals: row.key.iter().map(GroupValue::is_total).collect(),
                grouping_id: row.grouping_id(),
                measure: row.measure.map(|m| m.to_string()),
            })
            .collect();

        AggregateResponse {
            attributes: result.attributes.clone(),
            measure: result.measure.clone(),
            rows,
        }
    }
}

/// Renders a result as an aligned text table.
/// Totals print as `*`; nulls (values and measures) print as `NULL`.
pub fn render_table(result: &AggregateResult) -> String {
    let mut header: Vec<String> = result.attributes.clone();
    header.push(result.measure.clone());

    let body: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = row
                .key
                .iter()
                .map(|g| match g {
                    GroupValue::Total => TOTAL_MARKER.to_string(),
                    GroupValue::Value(v) => v.to_string(),
                })
                .collect();
            cells.push(row.measure.map_or_else(|| NULL_TEXT.to_string(), |m| m.to_string()));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let measure_column = header.len() - 1;
    let format_line = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == measure_column {
                    format!("{:>width$}", cell, width = widths[i])
                } else {
                    format!("{:<width$}", cell, width = widths[i])
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(format_line(header.as_slice()));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for cells in &body {
        lines.push(format_line(cells.as_slice()));
    }
    lines.join("\n")
}

// ============================================================================
// VIEWS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    pub name: String,
    pub refreshed_at: DateTime<Utc>,
    pub source_version: u64,
    pub refresh_count: u64,
    pub row_count: usize,
    pub stale: bool,
}

impl ViewInfo {
    pub fn new(view: &MaterializedAggregate, stale: bool) -> Self {
        ViewInfo {
            name: view.name.clone(),
            refreshed_at: view.refreshed_at,
            source_version: view.source_version,
            refresh_count: view.refresh_count,
            row_count: view.result.len(),
            stale,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}  rows={}  refreshed={}  version={}  refreshes={}{}",
            self.name,
            self.row_count,
            self.refreshed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.source_version,
            self.refresh_count,
            if self.stale { "  (stale)" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub view: ViewInfo,
    pub result: AggregateResponse,
}

// ============================================================================
// LOADS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub entity: String,
    pub rows_loaded: usize,
    pub total_rows: usize,
    pub version: u64,
}

impl From<&LoadSummary> for LoadResponse {
    fn from(summary: &LoadSummary) -> Self {
        LoadResponse {
            entity: summary.entity.clone(),
            rows_loaded: summary.rows_loaded,
            total_rows: summary.total_rows,
            version: summary.version,
        }
    }
}

impl LoadResponse {
    pub fn render(&self) -> String {
        format!(
            "Loaded {} rows into {} ({} total, version {})",
            self.rows_loaded, self.entity, self.total_rows, self.version
        )
    }
}

// ============================================================================
// CONFIG RUNS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub loads: Vec<LoadResponse>,
    pub views: Vec<ViewInfo>,
}

impl RunResponse {
    pub fn render(&self) -> String {
        self.loads
            .iter()
            .map(LoadResponse::render)
            .chain(self.views.iter().map(ViewInfo::render))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
