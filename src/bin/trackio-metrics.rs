//! trackio-metrics: inspect experiment metrics from the terminal
//!
//! Lists projects, runs and metrics, and prints the derived series a plot
//! would render.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trackio_metrics::cache::SeriesCache;
use trackio_metrics::config::DEFAULT_MAX_POINTS;
use trackio_metrics::format::{format_json, format_number, format_timestamp, truncate};
use trackio_metrics::query::{Explorer, QueryRequest, QueryResult};
use trackio_metrics::store::SqliteStore;
use trackio_metrics::{AxisMode, Config, SeriesOptions, SmoothingLevel};

const RUN_COLUMN_WIDTH: usize = 32;

/// Inspect trackio experiment metrics
#[derive(Parser)]
#[command(name = "trackio-metrics")]
#[command(about = "Retrieve and transform trackio experiment metrics")]
#[command(version)]
struct Cli {
    /// Directory holding `<project>.db` files (defaults to `$TRACKIO_DIR`)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects
    Projects,

    /// List the runs of a project
    Runs {
        /// Project name
        project: String,

        /// Also print each run's config
        #[arg(long)]
        config: bool,
    },

    /// List metric names, grouped by prefix
    Metrics {
        /// Project name
        project: String,

        /// Runs to include (all runs if omitted)
        #[arg(short, long = "run")]
        runs: Vec<String>,
    },

    /// Print the derived series of the selected runs
    Query {
        /// Project name
        project: String,

        #[command(flatten)]
        plot: PlotArgs,
    },

    /// Print the system (hardware) series of the selected runs
    System {
        /// Project name
        project: String,

        #[command(flatten)]
        plot: PlotArgs,
    },
}

/// Run selection and chart options shared by `query` and `system`.
#[derive(Args)]
struct PlotArgs {
    /// Runs to plot, in selection order (all runs if omitted)
    #[arg(short, long = "run")]
    runs: Vec<String>,

    /// Case-insensitive metric name filter
    #[arg(short, long, default_value = "")]
    filter: String,

    /// X axis: step, relative or wall
    #[arg(short, long, default_value = "step")]
    axis: AxisMode,

    /// Smoothing level, 0 to 20
    #[arg(short, long, default_value = "0")]
    smoothing: SmoothingLevel,

    /// Log scale on the x axis
    #[arg(long)]
    log_x: bool,

    /// Log scale on the y axis
    #[arg(long)]
    log_y: bool,

    /// Downsample series longer than this (0 keeps every point)
    #[arg(long)]
    max_points: Option<usize>,
}

impl PlotArgs {
    fn options(&self, config: &Config) -> SeriesOptions {
        SeriesOptions {
            axis: self.axis,
            smoothing: self.smoothing,
            log_x: self.log_x,
            log_y: self.log_y,
            max_points: self
                .max_points
                .or(config.default_options().max_points)
                .or(Some(DEFAULT_MAX_POINTS)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.root {
        Some(root) => Config::new(root),
        None => Config::from_env().context("Failed to resolve the trackio storage directory")?,
    };
    info!(root = %config.storage_root().display(), "using storage root");

    let explorer = Explorer::new(SqliteStore::from_config(&config), Arc::new(SeriesCache::new()));

    match cli.command {
        Commands::Projects => list_projects(&explorer).await?,
        Commands::Runs { project, config } => list_runs(&explorer, &project, config).await?,
        Commands::Metrics { project, runs } => list_metrics(&explorer, &project, runs).await?,
        Commands::Query { project, plot } => {
            let request = plot_request(&explorer, &config, project, plot).await?;
            print_groups(&explorer.query(&request).await);
        }
        Commands::System { project, plot } => {
            let request = plot_request(&explorer, &config, project, plot).await?;
            print_groups(&explorer.query_system(&request).await);
        }
    }

    Ok(())
}

async fn list_projects(explorer: &Explorer<SqliteStore>) -> Result<()> {
    let projects = explorer.list_projects().await.context("Failed to list projects")?;
    if projects.is_empty() {
        println!("No projects found");
    }
    for project in projects.iter() {
        println!("{project}");
    }
    Ok(())
}

async fn list_runs(explorer: &Explorer<SqliteStore>, project: &str, with_config: bool) -> Result<()> {
    let runs = explorer
        .list_runs(project)
        .await
        .with_context(|| format!("Failed to list runs of '{project}'"))?;
    for run in runs.iter() {
        let started = run.start_time().map_or_else(|| "-".to_string(), format_timestamp);
        println!("{:<width$}  {started}", truncate(run.run_id(), RUN_COLUMN_WIDTH), width = RUN_COLUMN_WIDTH);
        if with_config {
            if let Some(config) = run.config() {
                for line in format_json(config).lines() {
                    println!("    {line}");
                }
            }
        }
    }
    Ok(())
}

async fn list_metrics(explorer: &Explorer<SqliteStore>, project: &str, runs: Vec<String>) -> Result<()> {
    let runs = resolve_runs(explorer, project, runs).await?;
    let names = explorer
        .list_metric_names(project, &runs)
        .await
        .with_context(|| format!("Failed to list metrics of '{project}'"))?;
    for (group, metrics) in trackio_metrics::grouping::group_metrics(&names) {
        println!("{group}");
        for metric in metrics {
            println!("  {metric}");
        }
    }
    Ok(())
}

/// Every run of `project` when `runs` is empty.
async fn resolve_runs(explorer: &Explorer<SqliteStore>, project: &str, runs: Vec<String>) -> Result<Vec<String>> {
    if !runs.is_empty() {
        return Ok(runs);
    }
    let all = explorer
        .list_runs(project)
        .await
        .with_context(|| format!("Failed to list runs of '{project}'"))?;
    Ok(all.iter().map(|run| run.run_id().to_string()).collect())
}

async fn plot_request(
    explorer: &Explorer<SqliteStore>,
    config: &Config,
    project: String,
    plot: PlotArgs,
) -> Result<QueryRequest> {
    let options = plot.options(config);
    let runs = resolve_runs(explorer, &project, plot.runs).await?;
    Ok(QueryRequest::new(project, &runs)
        .metric_filter(plot.filter)
        .options(options))
}

fn print_groups<G: Ord + Display>(result: &QueryResult<G>) {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if result.is_empty() {
        println!("No data");
        return;
    }

    for (group, series) in &result.groups {
        println!("{group}");
        for (key, line) in series {
            let run = truncate(&key.run_id, RUN_COLUMN_WIDTH);
            let run = result
                .colors
                .get(&key.run_id)
                .map_or_else(|| run.clone(), |color| color.paint(&run));
            let last = line
                .last()
                .map_or_else(|| "-".to_string(), |point| format_number(point.y, 4));
            print!("  {run}  {}  points={} last={last}", key.metric, line.len());
            if line.excluded_by_log() > 0 {
                print!(" excluded={}", line.excluded_by_log());
            }
            println!();
        }
    }
}
