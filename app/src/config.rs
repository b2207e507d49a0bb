//! FILENAME: app/src/config.rs
//! PURPOSE: Warehouse configuration file (JSON).
//! CONTEXT: A config names CSV sources to load in order and views to
//! materialize afterwards. Relative source paths resolve against the
//! config file's directory.

use std::path::{Path, PathBuf};

use aggregate_engine::AggregationSpec;
use persistence::CsvOptions;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::logging::LogLevel;

/// One CSV file loaded into one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub entity: String,
    pub path: PathBuf,
}

/// A named aggregation materialized after the sources are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    pub spec: AggregationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WarehouseConfig {
    pub log_file: Option<PathBuf>,
    pub log_level: LogLevel,
    pub csv: CsvOptions,
    pub sources: Vec<SourceConfig>,
    pub views: Vec<ViewConfig>,
}

impl WarehouseConfig {
    pub fn from_json(text: &str) -> AppResult<Self> {
        serde_json::from_str(text).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Reads a config file and resolves its relative paths.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
        if let Some(log_file) = self.log_file.as_mut().filter(|p| p.is_relative()) {
            *log_file = base.join(&*log_file);
        }
    }

    /// Rejects configs that could only fail later.
    pub fn validate(&self) -> AppResult<()> {
        if !self.csv.delimiter.is_ascii() {
            return Err(AppError::Config(format!(
                "csv delimiter '{}' must be a single-byte character",
                self.csv.delimiter
            )));
        }
        let mut names: Vec<&str> = Vec::with_capacity(self.views.len());
        for view in &self.views {
            if view.name.trim().is_empty() {
                return Err(AppError::Config("view name is empty".to_string()));
            }
            if names.contains(&view.name.as_str()) {
                return Err(AppError::Config(format!("view '{}' is declared twice", view.name)));
            }
            names.push(&view.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggregate_engine::{AggregationType, GroupingSpec, MeasureOperand};

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = WarehouseConfig::from_json("{}").unwrap();
        assert_eq!(config, WarehouseConfig::default());
        assert_eq!(config.csv.delimiter, ',');
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "log_level": "debug",
            "csv": { "delimiter": ";" },
            "sources": [{ "entity": "dim_product", "path": "products.csv" }],
            "views": [{
                "name": "revenue_by_year",
                "spec": {
                    "measure": {
                        "aggregation": "Sum",
                        "operand": { "Product": ["price_per_unit", "quantity_sold"] }
                    },
                    "grouping": { "Rollup": ["year"] }
                }
            }]
        }"#;

        let mut config = WarehouseConfig::from_json(json).unwrap();
        config.resolve_paths(Path::new("/data"));

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.csv.delimiter, ';');
        assert_eq!(config.csv.date_format, "%Y-%m-%d");
        assert_eq!(config.sources[0].path, PathBuf::from("/data/products.csv"));

        let spec = &config.views[0].spec;
        assert_eq!(spec.fact, "fact_sales");
        assert_eq!(spec.measure.aggregation, AggregationType::Sum);
        assert!(matches!(spec.measure.operand, MeasureOperand::Product(_, _)));
        assert_eq!(spec.grouping, GroupingSpec::Rollup(vec!["year".to_string()]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_view_names_rejected() {
        let view = r#"{"name": "v", "spec": {"measure": {"aggregation": "Max", "operand": {"Attribute": "quantity_sold"}}, "grouping": {"Groups": []}}}"#;
        let json = format!(r#"{{"views": [{}, {}]}}"#, view, view);
        let config = WarehouseConfig::from_json(&json).unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }
}
