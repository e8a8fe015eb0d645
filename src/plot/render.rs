//! plotters drawing for threshold panels.

use super::{Layout, PanelData, PlotError, PlotStyle};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// Render to `output`, picking the backend from the file extension.
pub(super) fn render_to_file(
    layout: Layout,
    panels: &[PanelData],
    style: &PlotStyle,
    output: &Path,
) -> Result<(), PlotError> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "svg" => {
            let root = SVGBackend::new(output, style.size).into_drawing_area();
            draw_figure(&root, layout, panels, style)
        }
        "png" | "" => {
            let root = BitMapBackend::new(output, style.size).into_drawing_area();
            draw_figure(&root, layout, panels, style)
        }
        other => Err(PlotError::UnsupportedFormat(other.to_string())),
    }
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    layout: Layout,
    panels: &[PanelData],
    style: &PlotStyle,
) -> Result<(), PlotError> {
    root.fill(&WHITE).map_err(PlotError::backend)?;

    let areas = root.split_evenly(layout.grid());
    for (area, panel) in areas.iter().zip(panels) {
        draw_panel(area, panel, style)?;
    }

    root.present().map_err(PlotError::backend)?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &PanelData,
    style: &PlotStyle,
) -> Result<(), PlotError> {
    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", f64::from(style.caption_font_size)))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(panel.ranges.x.clone(), panel.ranges.y.clone().log_scale())
        .map_err(PlotError::backend)?;

    let mut mesh = chart.configure_mesh();
    if panel.axes.x_label {
        mesh.x_desc(style.x_label.as_str());
    }
    if panel.axes.y_label {
        mesh.y_desc(style.y_label.as_str());
    }
    mesh.draw().map_err(PlotError::backend)?;

    let floor = panel.ranges.y.start;
    for (idx, series) in panel.series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();

        chart
            .draw_series(LineSeries::new(
                series.points.iter().map(|pt| (pt.p, pt.pfail)),
                color.stroke_width(1),
            ))
            .map_err(PlotError::backend)?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

        chart
            .draw_series(series.points.iter().map(|pt| {
                ErrorBar::new_vertical(
                    pt.p,
                    (pt.pfail - pt.err).max(floor),
                    pt.pfail,
                    pt.pfail + pt.err,
                    color.filled(),
                    8,
                )
            }))
            .map_err(PlotError::backend)?;

        chart
            .draw_series(
                series
                    .points
                    .iter()
                    .map(|pt| Circle::new((pt.p, pt.pfail), style.marker_size, color.filled())),
            )
            .map_err(PlotError::backend)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(PlotError::backend)?;

    Ok(())
}
