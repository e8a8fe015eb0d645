//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::plot::CycleFilter;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// qec-threshold - QEC threshold study summaries and plots
///
/// Aggregates per-run simulation result files into a summary table and
/// draws threshold plots from it.
///
/// Examples:
///   qec-threshold aggregate results/surface_code
///   qec-threshold aggregate results/sweep --boundaries
///   qec-threshold plot single results/surface_code_data.csv --cycles 5 -L 3,5,7
///   qec-threshold plot double --panel a_data.csv --panel b_data.csv@10 -L 3,5 --title A --title B
///   qec-threshold --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .qec-threshold.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true, env = "QEC_THRESHOLD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .qec-threshold.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate a directory of run records into <DIR>_data.csv
    Aggregate(AggregateArgs),

    /// Draw threshold plots from summary tables
    Plot {
        #[command(subcommand)]
        layout: PlotCommand,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AggregateArgs {
    /// Directory holding one record file per run
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    /// Records carry boundary sweep fields; add schedule/frequency columns
    #[arg(short, long)]
    pub boundaries: bool,

    /// Record file extension (default: json)
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Write the summary here instead of <DIR>_data.csv
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with status 2 if any record file had to be skipped
    #[arg(long)]
    pub strict: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PlotCommand {
    /// One panel
    Single(SinglePlotArgs),
    /// Two panels side by side
    Double(MultiPlotArgs),
    /// Four panels in a 2x2 grid
    Four(MultiPlotArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SinglePlotArgs {
    /// Summary table produced by `aggregate`
    #[arg(value_name = "CSV")]
    pub summary: PathBuf,

    /// Cycle count to plot, or "all" to use every row
    #[arg(long, default_value = "all", value_name = "N")]
    pub cycles: CycleFilter,

    /// Lattice sizes to draw, one curve each (comma-separated)
    #[arg(short = 'L', long, value_delimiter = ',', required = true, value_name = "SIZES")]
    pub lattice: Vec<i64>,

    /// Panel title
    #[arg(short, long, default_value = "")]
    pub title: String,

    /// Output image (.png or .svg)
    #[arg(short, long, default_value = "threshold.png", value_name = "FILE")]
    pub output: PathBuf,

    /// Figure size in pixels, e.g. 1000x700
    #[arg(long, value_name = "WxH")]
    pub size: Option<FigureSize>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MultiPlotArgs {
    /// Summary table per panel, optionally `file.csv@N` to keep only cycle count N
    #[arg(long = "panel", required = true, value_name = "CSV[@N]")]
    pub panels: Vec<PanelSource>,

    /// Lattice sizes to draw in every panel (comma-separated)
    #[arg(short = 'L', long, value_delimiter = ',', required = true, value_name = "SIZES")]
    pub lattice: Vec<i64>,

    /// Panel titles, one per panel in panel order
    #[arg(short, long = "title", value_name = "TITLE")]
    pub titles: Vec<String>,

    /// Output image (.png or .svg)
    #[arg(short, long, default_value = "threshold.png", value_name = "FILE")]
    pub output: PathBuf,

    /// Figure size in pixels, e.g. 1600x600
    #[arg(long, value_name = "WxH")]
    pub size: Option<FigureSize>,
}

impl MultiPlotArgs {
    /// Titles padded with empty strings up to the panel count.
    pub fn titles_for(&self, panels: usize) -> Vec<String> {
        let mut titles = self.titles.clone();
        titles.resize(panels, String::new());
        titles
    }
}

/// Figure dimensions given as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureSize {
    pub width: u32,
    pub height: u32,
}

impl FromStr for FigureSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Expected WIDTHxHEIGHT, got '{}'", s))?;
        let width: u32 = w.trim().parse().map_err(|_| format!("Invalid width '{}'", w))?;
        let height: u32 = h.trim().parse().map_err(|_| format!("Invalid height '{}'", h))?;
        if width == 0 || height == 0 {
            return Err("Figure size must be non-zero".to_string());
        }
        Ok(Self { width, height })
    }
}

/// A summary table for one panel, with an optional cycle count filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSource {
    pub path: PathBuf,
    pub cycles: CycleFilter,
}

impl FromStr for PanelSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((path, cycles)) if !path.is_empty() => Ok(Self {
                path: PathBuf::from(path),
                cycles: cycles.parse()?,
            }),
            _ => Ok(Self {
                path: PathBuf::from(s),
                cycles: CycleFilter::All,
            }),
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match self.command {
            None => Err("No command given; see --help".to_string()),
            Some(Command::Aggregate(ref agg)) => {
                if !agg.directory.exists() {
                    return Err(format!(
                        "Results directory does not exist: {}",
                        agg.directory.display()
                    ));
                }
                if !agg.directory.is_dir() {
                    return Err(format!(
                        "Results path is not a directory: {}",
                        agg.directory.display()
                    ));
                }
                if let Some(ref ext) = agg.extension {
                    if ext.trim_start_matches('.').is_empty() {
                        return Err("Extension must not be empty".to_string());
                    }
                }
                Ok(())
            }
            Some(Command::Plot { ref layout }) => match layout {
                PlotCommand::Single(single) => validate_lattice(&single.lattice),
                PlotCommand::Double(multi) => validate_multi(multi, 2),
                PlotCommand::Four(multi) => validate_multi(multi, 4),
            },
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            // Skipped record files are reported at WARN and must stay visible.
            tracing::Level::WARN
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn validate_lattice(lattice: &[i64]) -> Result<(), String> {
    if lattice.is_empty() {
        return Err("At least one lattice size is required".to_string());
    }
    Ok(())
}

fn validate_multi(multi: &MultiPlotArgs, panels: usize) -> Result<(), String> {
    validate_lattice(&multi.lattice)?;
    if multi.panels.len() != panels {
        return Err(format!(
            "Expected {} --panel values, got {}",
            panels,
            multi.panels.len()
        ));
    }
    if multi.titles.len() > panels {
        return Err(format!(
            "Expected at most {} --title values, got {}",
            panels,
            multi.titles.len()
        ));
    }
    Ok(())
}
