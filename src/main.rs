//! qec-threshold - QEC threshold study summaries and plots
//!
//! Aggregates per-run simulation result files into a summary table and
//! renders threshold plots from summary tables.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid record, unreadable file, drawing failure, etc.)
//!   2 - `aggregate --strict` skipped at least one malformed file

mod analysis;
mod cli;
mod config;
mod models;
mod plot;
mod report;
mod scanner;

use anyhow::{Context, Result};
use cli::{AggregateArgs, Args, Command, MultiPlotArgs, PlotCommand};
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use models::{RowSchema, SummaryPoint};
use plot::PlotStyle;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    debug!("qec-threshold v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .qec-threshold.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence over the verbosity flags when set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Dispatch the subcommand. Returns the process exit code.
fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    match args.command {
        Some(Command::Aggregate(ref agg)) => run_aggregate(agg, &config, args.quiet),
        Some(Command::Plot { ref layout }) => {
            run_plot(layout, &config)?;
            Ok(0)
        }
        None => Ok(0),
    }
}

fn run_aggregate(agg: &AggregateArgs, config: &Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();
    let schema = RowSchema::from_boundaries(config.aggregate.boundaries);
    let scan_config = scanner::ScanConfig::from(&config.aggregate);

    let output = match agg.output {
        Some(ref path) => path.clone(),
        None => report::summary_path(&agg.directory)?,
    };

    info!(
        "Aggregating *.{} records in {} ({:?} schema)",
        scan_config.extension,
        agg.directory.display(),
        schema
    );

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb
    };

    let collected =
        analysis::collect_directory(&agg.directory, &scan_config, schema, &progress)?;
    progress.finish_and_clear();

    if collected.aggregator.is_empty() {
        warn!("No records found in {}", agg.directory.display());
    }

    let table = collected.aggregator.to_table();
    report::write_summary_file(&table, &output)?;

    info!(
        "{} records read, {} skipped, {} rows written to {} in {:.1}s",
        collected.files_read,
        collected.skipped.len(),
        table.rows.len(),
        output.display(),
        start_time.elapsed().as_secs_f64()
    );

    if config.aggregate.strict && !collected.skipped.is_empty() {
        warn!(
            "{} malformed record file(s) skipped; failing (exit code 2)",
            collected.skipped.len()
        );
        return Ok(2);
    }

    Ok(0)
}

fn run_plot(layout: &PlotCommand, config: &Config) -> Result<()> {
    let style = PlotStyle::from(&config.plot);

    match layout {
        PlotCommand::Single(single) => {
            let rows = report::read_points_file(&single.summary)?;
            plot::plot_single(
                &rows,
                single.cycles,
                &single.lattice,
                &single.title,
                &style,
                &single.output,
            )
        }
        PlotCommand::Double(multi) => {
            let row_sets = load_panels(multi)?;
            plot::plot_double(
                &row_sets,
                &multi.lattice,
                &multi.titles_for(2),
                &style,
                &multi.output,
            )
        }
        PlotCommand::Four(multi) => {
            let row_sets = load_panels(multi)?;
            plot::plot_four(
                &row_sets,
                &multi.lattice,
                &multi.titles_for(4),
                &style,
                &multi.output,
            )
        }
    }
}

/// Read each panel's summary table and apply its cycle filter.
fn load_panels(multi: &MultiPlotArgs) -> Result<Vec<Vec<SummaryPoint>>> {
    multi
        .panels
        .iter()
        .map(|source| {
            let rows = report::read_points_file(&source.path)?;
            Ok(source.cycles.apply(&rows))
        })
        .collect()
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            debug!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
