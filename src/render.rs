//! Headless bitmap rendering for Pareto fronts.

use std::error::Error;
use std::ops::Range;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pareto::{DisplayFront, ReportError};

const FONT_FAMILY: &str = "sans-serif";
const POINTS_PER_INCH: f64 = 72.0;
const RANGE_PAD_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotStyle {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series_label: String,
    pub font_size_pt: f64,
    pub marker_size_pt: f64,
    pub grid_alpha: f64,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width_in: 6.4,
            height_in: 4.8,
            dpi: 600,
            title: "Pareto Front".to_string(),
            x_label: "Accuracy".to_string(),
            y_label: "Time (s)".to_string(),
            series_label: "Pareto front".to_string(),
            font_size_pt: 10.0,
            marker_size_pt: 3.0,
            grid_alpha: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierLine {
    Hidden,
    /// Points joined in ascending x order. Cosmetic only.
    SortedByX,
}

/// Explicit rendering state passed to the reporters.
///
/// Every figure is drawn on a canvas that is acquired for one target file
/// and released before the call returns; nothing is shared between calls.
///
/// Titles, labels and the legend are laid out with the system `sans-serif`
/// font family, resolved through fontconfig. A host with no installed fonts
/// cannot render text, and every draw fails with [`ReportError::Render`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderContext {
    style: PlotStyle,
}

impl RenderContext {
    pub fn new(style: PlotStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &PlotStyle {
        &self.style
    }

    /// Canvas size in pixels for the configured figure size and DPI.
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = self.style.dpi as f64;
        (
            ((self.style.width_in * dpi).round() as u32).max(1),
            ((self.style.height_in * dpi).round() as u32).max(1),
        )
    }

    fn points_to_px(&self, points: f64) -> u32 {
        ((points * self.style.dpi as f64 / POINTS_PER_INCH).round() as u32).max(1)
    }

    /// Opens a bitmap canvas for `path`, runs `draw` on it, then encodes the
    /// image to disk. The canvas is dropped before returning.
    pub fn draw_to_file<F>(&self, path: &Path, draw: F) -> Result<(), ReportError>
    where
        F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<(), Box<dyn Error>>,
    {
        let render_err = |message: String| ReportError::Render {
            path: path.to_path_buf(),
            message,
        };

        let size = self.pixel_size();
        debug!(
            component = "render",
            event = "render.canvas.acquire",
            path = %path.display(),
            width_px = size.0,
            height_px = size.1
        );

        {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            root.fill(&WHITE).map_err(|err| render_err(err.to_string()))?;
            draw(&root).map_err(|err| render_err(err.to_string()))?;
            root.present().map_err(|err| render_err(err.to_string()))?;
        }

        debug!(
            component = "render",
            event = "render.canvas.release",
            path = %path.display()
        );
        Ok(())
    }

    pub(crate) fn draw_front(
        &self,
        path: &Path,
        front: &DisplayFront,
        line: FrontierLine,
    ) -> Result<(), ReportError> {
        let style = &self.style;
        let font_px = self.points_to_px(style.font_size_pt);
        let title_px = self.points_to_px(style.font_size_pt * 1.2);
        let marker_px = self.points_to_px(style.marker_size_pt);
        let line_px = self.points_to_px(1.0);

        let points: Vec<(f64, f64)> = front
            .points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        let x_range = padded_range(points.iter().map(|(x, _)| *x));
        let y_range = padded_range(points.iter().map(|(_, y)| *y));

        self.draw_to_file(path, |root| {
            let mut chart = ChartBuilder::on(root)
                .caption(&style.title, (FONT_FAMILY, title_px))
                .margin(font_px / 2)
                .x_label_area_size(font_px * 3)
                .y_label_area_size(font_px * 4)
                .build_cartesian_2d(x_range, y_range)?;

            chart
                .configure_mesh()
                .x_desc(style.x_label.as_str())
                .y_desc(style.y_label.as_str())
                .label_style((FONT_FAMILY, font_px))
                .axis_desc_style((FONT_FAMILY, font_px))
                .bold_line_style(BLACK.mix(style.grid_alpha))
                .max_light_lines(0)
                .draw()?;

            if line == FrontierLine::SortedByX {
                let mut sorted = points.clone();
                sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
                chart.draw_series(LineSeries::new(
                    sorted,
                    BLUE.mix(0.5).stroke_width(line_px),
                ))?;
            }

            chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y)| Circle::new((x, y), marker_px, BLUE.filled())),
                )?
                .label(style.series_label.as_str())
                .legend(move |(x, y)| Circle::new((x, y), marker_px, BLUE.filled()));

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .label_font((FONT_FAMILY, font_px))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;

            Ok(())
        })
    }
}

/// Range covering all finite values with a small margin on each side.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values.filter(|v| v.is_finite()) {
        min = min.min(value);
        max = max.max(value);
    }
    if !min.is_finite() || !max.is_finite() {
        return -1.0..1.0;
    }
    let span = max - min;
    if span < 1e-12 {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = span * RANGE_PAD_FRACTION;
    (min - pad)..(max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_scales_with_dpi() {
        let ctx = RenderContext::default();
        assert_eq!(ctx.pixel_size(), (3840, 2880));

        let ctx = RenderContext::new(PlotStyle {
            dpi: 100,
            ..PlotStyle::default()
        });
        assert_eq!(ctx.pixel_size(), (640, 480));
        assert_eq!(ctx.points_to_px(10.0), 14);
    }

    #[test]
    fn padded_range_handles_degenerate_input() {
        assert_eq!(padded_range(std::iter::empty()), -1.0..1.0);
        assert_eq!(padded_range([2.0, 2.0].into_iter()), 1.5..2.5);
        assert_eq!(padded_range([f64::NAN].into_iter()), -1.0..1.0);

        let range = padded_range([0.0, 10.0].into_iter());
        assert!((range.start + 0.5).abs() < 1e-12);
        assert!((range.end - 10.5).abs() < 1e-12);
    }
}
