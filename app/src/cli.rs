//! FILENAME: app/src/cli.rs
//! PURPOSE: Command-line interface of the `starwh` binary.
//! CONTEXT: Every command works against one snapshot file. Commands that
//! change the warehouse write the snapshot back before returning.

use std::path::{Path, PathBuf};

use aggregate_engine::{AggregationSpec, AggregationType, FilterPredicate, GroupingSpec, Measure};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::star::SALES_FACT;
use engine::DEFAULT_DATE_FORMAT;
use persistence::CsvOptions;
use serde::Serialize;

use crate::api_types::{
    render_table, AggregateResponse, LoadResponse, RunResponse, ViewInfo, ViewResponse,
};
use crate::config::WarehouseConfig;
use crate::logging::{init_log_file, install_log_bridge, LogLevel};
use crate::state::{create_warehouse_state, WarehouseState};
use crate::{log_enter_info, log_exit_info, log_info};

#[derive(Parser, Debug)]
#[command(name = "starwh")]
#[command(author, version, about = "Star schema warehouse with rollups, cubes and materialized views", long_about = None)]
pub struct Cli {
    /// Snapshot file holding the warehouse
    #[arg(short, long, default_value = "warehouse.starwh", global = true)]
    pub snapshot: PathBuf,

    /// Append log lines to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Minimum log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Print JSON instead of text tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty warehouse with the sales star schema
    Init {
        /// Overwrite an existing snapshot
        #[arg(long)]
        force: bool,
    },

    /// Load a CSV file into an entity as one all-or-nothing batch
    Load {
        /// Entity name (e.g. dim_date, fact_sales)
        entity: String,

        /// CSV file with a header row
        csv: PathBuf,

        #[arg(long, default_value_t = ',')]
        delimiter: char,

        #[arg(long, default_value = DEFAULT_DATE_FORMAT)]
        date_format: String,
    },

    /// Run an aggregation against the current data
    Query(SpecArgs),

    /// Compute an aggregation once and cache it under a name
    Materialize {
        name: String,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Show a materialized view as last computed
    Read { name: String },

    /// Recompute a materialized view from the current data
    Refresh { name: String },

    /// Remove a materialized view
    Drop { name: String },

    /// List materialized views
    Views,

    /// Load the sources and views named in a config file
    Run {
        /// Warehouse config (JSON)
        config: PathBuf,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Load { .. } => "load",
            Commands::Query(_) => "query",
            Commands::Materialize { .. } => "materialize",
            Commands::Read { .. } => "read",
            Commands::Refresh { .. } => "refresh",
            Commands::Drop { .. } => "drop",
            Commands::Views => "views",
            Commands::Run { .. } => "run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MeasureArg {
    Sum,
    Max,
    Avg,
    Min,
    Count,
}

impl From<MeasureArg> for AggregationType {
    fn from(arg: MeasureArg) -> Self {
        match arg {
            MeasureArg::Sum => AggregationType::Sum,
            MeasureArg::Max => AggregationType::Max,
            MeasureArg::Avg => AggregationType::Average,
            MeasureArg::Min => AggregationType::Min,
            MeasureArg::Count => AggregationType::Count,
        }
    }
}

/// Flags describing one aggregation.
#[derive(Args, Debug, Clone)]
pub struct SpecArgs {
    /// JSON file holding a complete aggregation spec; other spec flags are ignored
    #[arg(long)]
    pub spec: Option<PathBuf>,

    /// Aggregation function
    #[arg(long, value_enum, default_value_t = MeasureArg::Sum)]
    pub measure: MeasureArg,

    /// Numeric attribute to aggregate [default: price_per_unit * quantity_sold]
    #[arg(long)]
    pub of: Option<String>,

    /// Plain GROUP BY attributes
    #[arg(long, value_delimiter = ',')]
    pub group: Vec<String>,

    /// ROLLUP attributes, outermost first
    #[arg(long, value_delimiter = ',')]
    pub rollup: Vec<String>,

    /// CUBE attributes
    #[arg(long, value_delimiter = ',')]
    pub cube: Vec<String>,

    /// One grouping set per flag, attributes comma separated ("" = grand total)
    #[arg(long = "set")]
    pub sets: Vec<String>,

    /// Equality filter `attribute=value`; repeated filters are ANDed
    #[arg(long = "where")]
    pub filters: Vec<String>,

    /// Format of date literals in filters
    #[arg(long, default_value = DEFAULT_DATE_FORMAT)]
    pub date_format: String,
}

fn split_attributes(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl SpecArgs {
    fn grouping(&self) -> Result<GroupingSpec> {
        let chosen = [!self.group.is_empty(), !self.rollup.is_empty(), !self.cube.is_empty(), !self.sets.is_empty()]
            .iter()
            .filter(|&&set| set)
            .count();
        if chosen > 1 {
            bail!("use only one of --group, --rollup, --cube or --set");
        }

        Ok(if !self.rollup.is_empty() {
            GroupingSpec::Rollup(self.rollup.clone())
        } else if !self.cube.is_empty() {
            GroupingSpec::Cube(self.cube.clone())
        } else if !self.sets.is_empty() {
            GroupingSpec::GroupingSets(self.sets.iter().map(|s| split_attributes(s)).collect())
        } else {
            GroupingSpec::Groups(self.group.clone())
        })
    }

    /// Builds the aggregation, typing filter literals against the schema.
    pub fn to_spec(&self, state: &WarehouseState) -> Result<AggregationSpec> {
        if let Some(path) = &self.spec {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading spec {:?}", path))?;
            return serde_json::from_str(&text).with_context(|| format!("parsing spec {:?}", path));
        }

        let aggregation = AggregationType::from(self.measure);
        let measure = match &self.of {
            Some(attribute) => Measure::of(aggregation, attribute.clone()),
            None => Measure::revenue(aggregation),
        };
        let mut spec = AggregationSpec::sales(measure, self.grouping()?);

        let mut filter: Option<FilterPredicate> = None;
        for clause in &self.filters {
            let (attribute, literal) = clause
                .split_once('=')
                .with_context(|| format!("filter '{}' is not attribute=value", clause))?;
            let attribute = attribute.trim();
            let value = state.parse_literal(SALES_FACT, attribute, literal, &self.date_format)?;
            let predicate = FilterPredicate::equals(attribute, value);
            filter = Some(match filter {
                Some(existing) => existing.and(predicate),
                None => predicate,
            });
        }
        if let Some(filter) = filter {
            spec = spec.with_filter(filter);
        }
        Ok(spec)
    }
}

// ============================================================================
// EXECUTION
// ============================================================================

fn to_output<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(text())
    }
}

fn init_logging(cli: &Cli, config: Option<&WarehouseConfig>) -> Result<()> {
    let level = cli
        .log_level
        .or_else(|| config.map(|c| c.log_level))
        .unwrap_or(LogLevel::Warn);
    install_log_bridge(level);

    let log_file = cli.log_file.clone().or_else(|| config.and_then(|c| c.log_file.clone()));
    if let Some(path) = log_file {
        init_log_file(&path).map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

fn open_state(path: &Path) -> Result<WarehouseState> {
    if !path.exists() {
        bail!("no warehouse at {:?}; run `starwh init` first", path);
    }
    WarehouseState::open_snapshot(path).with_context(|| format!("opening {:?}", path))
}

fn save_state(state: &WarehouseState, path: &Path) -> Result<()> {
    state
        .save_snapshot(path)
        .with_context(|| format!("saving {:?}", path))?;
    Ok(())
}

fn view_output(json: bool, state: &WarehouseState, name: &str) -> Result<String> {
    let view = state.read_view(name)?;
    let info = ViewInfo::new(&view, state.view_is_stale(name)?);
    let response = ViewResponse {
        view: info.clone(),
        result: AggregateResponse::from(&view.result),
    };
    to_output(json, &response, || format!("{}\n{}", info.render(), render_table(&view.result)))
}

/// Runs one parsed command and returns what it prints.
pub fn execute(cli: Cli) -> Result<String> {
    let config = match &cli.command {
        Commands::Run { config } => {
            Some(WarehouseConfig::load(config).with_context(|| format!("loading config {:?}", config))?)
        }
        _ => None,
    };
    init_logging(&cli, config.as_ref())?;

    let command = cli.command.name();
    log_enter_info!("CLI", command, "snapshot={:?}", cli.snapshot);
    let path = cli.snapshot.as_path();
    let json = cli.json;

    let output = match &cli.command {
        Commands::Init { force } => {
            if path.exists() && !force {
                bail!("{:?} already exists; pass --force to overwrite", path);
            }
            let state = create_warehouse_state()?;
            save_state(&state, path)?;
            format!("Initialized empty star warehouse at {}", path.display())
        }

        Commands::Load { entity, csv, delimiter, date_format } => {
            let state = open_state(path)?;
            let options = CsvOptions {
                delimiter: *delimiter,
                date_format: date_format.clone(),
            };
            let summary = state
                .load_csv(entity, csv, &options)
                .with_context(|| format!("loading {:?} into {}", csv, entity))?;
            save_state(&state, path)?;
            let response = LoadResponse::from(&summary);
            to_output(json, &response, || response.render())?
        }

        Commands::Query(args) => {
            let state = open_state(path)?;
            let spec = args.to_spec(&state)?;
            let result = state.aggregate(&spec)?;
            to_output(json, &AggregateResponse::from(&result), || render_table(&result))?
        }

        Commands::Materialize { name, spec } => {
            let state = open_state(path)?;
            let spec = spec.to_spec(&state)?;
            state.materialize(name, spec)?;
            save_state(&state, path)?;
            view_output(json, &state, name)?
        }

        Commands::Read { name } => {
            let state = open_state(path)?;
            view_output(json, &state, name)?
        }

        Commands::Refresh { name } => {
            let state = open_state(path)?;
            state.refresh_view(name)?;
            save_state(&state, path)?;
            view_output(json, &state, name)?
        }

        Commands::Drop { name } => {
            let state = open_state(path)?;
            state.drop_view(name)?;
            save_state(&state, path)?;
            to_output(json, &serde_json::json!({ "dropped": name }), || format!("Dropped view {}", name))?
        }

        Commands::Views => {
            let state = open_state(path)?;
            let views: Vec<ViewInfo> = state
                .view_status()?
                .iter()
                .map(|(view, stale)| ViewInfo::new(view, *stale))
                .collect();
            to_output(json, &views, || {
                if views.is_empty() {
                    "(no materialized views)".to_string()
                } else {
                    views.iter().map(ViewInfo::render).collect::<Vec<_>>().join("\n")
                }
            })?
        }

        Commands::Run { .. } => {
            let config = config.as_ref().context("config was not loaded")?;
            let state = if path.exists() {
                open_state(path)?
            } else {
                log_info!("CLI", "No snapshot at {:?}; starting from the empty star schema", path);
                create_warehouse_state()?
            };
            let loads = state.apply_config(config)?;
            save_state(&state, path)?;

            let response = RunResponse {
                loads: loads.iter().map(LoadResponse::from).collect(),
                views: state
                    .view_status()?
                    .iter()
                    .map(|(view, stale)| ViewInfo::new(view, *stale))
                    .collect(),
            };
            to_output(json, &response, || response.render())?
        }
    };

    log_exit_info!("CLI", command);
    Ok(output)
}

/// Entry point of the `starwh` binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = execute(cli)?;
    println!("{}", output);
    Ok(())
}
