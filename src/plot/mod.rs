//! Threshold plots.
//!
//! Every layout draws the same panel: failure rate against physical error
//! rate on a log y axis, one error-bar curve per lattice size. Layouts only
//! differ in how many panels there are and which axes carry labels.

mod render;

use crate::config::PlotConfig;
use crate::models::SummaryPoint;
use anyhow::Result;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while drawing.
#[derive(Debug, Error)]
pub enum PlotError {
    /// A layout was given the wrong number of row sets or titles.
    #[error("{layout} layout needs {expected} panels, got {found}")]
    PanelCount {
        layout: Layout,
        expected: usize,
        found: usize,
    },

    /// The output path has an extension no backend handles.
    #[error("unsupported image format '{0}' (use .png or .svg)")]
    UnsupportedFormat(String),

    /// The drawing backend failed.
    #[error("drawing failed: {0}")]
    Backend(String),
}

impl PlotError {
    fn backend<E: fmt::Display>(err: E) -> Self {
        PlotError::Backend(err.to_string())
    }
}

/// Row selection by cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleFilter {
    /// Keep every row.
    #[default]
    All,
    /// Keep rows with this cycle count.
    Only(i64),
}

impl CycleFilter {
    pub fn apply(&self, rows: &[SummaryPoint]) -> Vec<SummaryPoint> {
        match self {
            CycleFilter::All => rows.to_vec(),
            CycleFilter::Only(n) => rows.iter().filter(|r| r.cycle_count == *n).copied().collect(),
        }
    }
}

impl FromStr for CycleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(CycleFilter::All);
        }
        s.parse()
            .map(CycleFilter::Only)
            .map_err(|_| format!("Expected a cycle count or 'all', got '{}'", s))
    }
}

/// Panel arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Single,
    Double,
    Four,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Single => write!(f, "single"),
            Layout::Double => write!(f, "double"),
            Layout::Four => write!(f, "four"),
        }
    }
}

/// Which axis labels a panel draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelAxes {
    pub x_label: bool,
    pub y_label: bool,
}

impl Layout {
    /// Grid shape as (rows, columns).
    pub fn grid(&self) -> (usize, usize) {
        match self {
            Layout::Single => (1, 1),
            Layout::Double => (1, 2),
            Layout::Four => (2, 2),
        }
    }

    pub fn panels(&self) -> usize {
        let (rows, cols) = self.grid();
        rows * cols
    }

    /// Labels for the panel at `index`, counted row-major.
    ///
    /// The y label goes on the left column only, the x label on the bottom row only.
    pub fn panel_axes(&self, index: usize) -> PanelAxes {
        let (rows, cols) = self.grid();
        PanelAxes {
            x_label: index / cols == rows - 1,
            y_label: index % cols == 0,
        }
    }
}

/// One plotted point with its symmetric error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub p: f64,
    pub pfail: f64,
    pub err: f64,
}

/// One curve: every row of a lattice size, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<SeriesPoint>,
}

/// Build one series per requested lattice size.
///
/// Points with a non-positive failure rate cannot sit on a log axis and are
/// dropped.
pub fn build_series(rows: &[SummaryPoint], lattice_sizes: &[i64]) -> Vec<Series> {
    lattice_sizes
        .iter()
        .map(|&lattice_size| {
            let points = rows
                .iter()
                .filter(|r| r.lattice_size == lattice_size)
                .filter(|r| {
                    let plottable = r.pfail > 0.0 && r.pfail.is_finite();
                    if !plottable {
                        debug!(
                            "L = {}: dropping p = {} with pfail = {}",
                            lattice_size, r.p, r.pfail
                        );
                    }
                    plottable
                })
                .map(|r| SeriesPoint {
                    p: r.p,
                    pfail: r.pfail,
                    err: r.err.abs(),
                })
                .collect();
            Series {
                label: format!("L = {}", lattice_size),
                points,
            }
        })
        .collect()
}

/// Axis extents for one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisRanges {
    pub x: Range<f64>,
    /// Strictly positive, for the log scale.
    pub y: Range<f64>,
}

impl AxisRanges {
    /// Extents covering every point and error bar, with some padding.
    pub fn for_series(series: &[Series]) -> Self {
        let points = || series.iter().flat_map(|s| s.points.iter());

        let (x_min, x_max) = points().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), pt| {
            (lo.min(pt.p), hi.max(pt.p))
        });
        let x = if !x_min.is_finite() {
            0.0..1.0
        } else if x_max - x_min <= f64::EPSILON * x_max.abs().max(1.0) {
            let pad = (x_min.abs() * 0.1).max(1e-3);
            (x_min - pad)..(x_max + pad)
        } else {
            let pad = (x_max - x_min) * 0.05;
            (x_min - pad)..(x_max + pad)
        };

        let y_min = points()
            .map(|pt| if pt.pfail - pt.err > 0.0 { pt.pfail - pt.err } else { pt.pfail })
            .fold(f64::INFINITY, f64::min);
        let y_max = points().map(|pt| pt.pfail + pt.err).fold(f64::NEG_INFINITY, f64::max);
        let y = if y_min.is_finite() && y_max.is_finite() {
            (y_min * 0.8)..(y_max * 1.25)
        } else {
            1e-3..1.0
        };

        Self { x, y }
    }
}

/// A panel ready to draw.
#[derive(Debug, Clone)]
pub struct PanelData {
    pub title: String,
    pub series: Vec<Series>,
    pub axes: PanelAxes,
    pub ranges: AxisRanges,
}

impl PanelData {
    fn new(title: &str, rows: &[SummaryPoint], lattice_sizes: &[i64], axes: PanelAxes) -> Self {
        let series = build_series(rows, lattice_sizes);
        let ranges = AxisRanges::for_series(&series);
        Self {
            title: title.to_string(),
            series,
            axes,
            ranges,
        }
    }
}

/// Drawing options shared by all layouts.
#[derive(Debug, Clone)]
pub struct PlotStyle {
    pub size: (u32, u32),
    pub x_label: String,
    pub y_label: String,
    pub marker_size: u32,
    pub caption_font_size: u32,
}

impl From<&PlotConfig> for PlotStyle {
    fn from(config: &PlotConfig) -> Self {
        Self {
            size: (config.width, config.height),
            x_label: config.x_label.clone(),
            y_label: config.y_label.clone(),
            marker_size: config.marker_size,
            caption_font_size: config.caption_font_size,
        }
    }
}

/// Lay out panels for `layout` from one row set and title per panel.
pub fn layout_panels(
    layout: Layout,
    row_sets: &[Vec<SummaryPoint>],
    lattice_sizes: &[i64],
    titles: &[String],
) -> Result<Vec<PanelData>, PlotError> {
    let expected = layout.panels();
    for found in [row_sets.len(), titles.len()] {
        if found != expected {
            return Err(PlotError::PanelCount {
                layout,
                expected,
                found,
            });
        }
    }

    Ok(row_sets
        .iter()
        .zip(titles)
        .enumerate()
        .map(|(i, (rows, title))| PanelData::new(title, rows, lattice_sizes, layout.panel_axes(i)))
        .collect())
}

/// One threshold panel from `rows`, optionally restricted to one cycle count.
pub fn plot_single(
    rows: &[SummaryPoint],
    cycle_filter: CycleFilter,
    lattice_sizes: &[i64],
    title: &str,
    style: &PlotStyle,
    output: &Path,
) -> Result<()> {
    let selected = cycle_filter.apply(rows);
    let panels = layout_panels(Layout::Single, &[selected], lattice_sizes, &[title.to_string()])?;
    draw(Layout::Single, &panels, style, output)
}

/// Two panels side by side.
pub fn plot_double(
    row_sets: &[Vec<SummaryPoint>],
    lattice_sizes: &[i64],
    titles: &[String],
    style: &PlotStyle,
    output: &Path,
) -> Result<()> {
    let panels = layout_panels(Layout::Double, row_sets, lattice_sizes, titles)?;
    draw(Layout::Double, &panels, style, output)
}

/// Four panels in a 2x2 grid.
pub fn plot_four(
    row_sets: &[Vec<SummaryPoint>],
    lattice_sizes: &[i64],
    titles: &[String],
    style: &PlotStyle,
    output: &Path,
) -> Result<()> {
    let panels = layout_panels(Layout::Four, row_sets, lattice_sizes, titles)?;
    draw(Layout::Four, &panels, style, output)
}

fn draw(layout: Layout, panels: &[PanelData], style: &PlotStyle, output: &Path) -> Result<()> {
    render::render_to_file(layout, panels, style, output)?;
    info!("Wrote {} plot to {}", layout, output.display());
    Ok(())
}
