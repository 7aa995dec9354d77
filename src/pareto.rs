//! Pareto front reporting: display normalization, plotting and persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, Ix2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::npz::{write_npz, NpzError};
use crate::render::{FrontierLine, RenderContext};

pub const OBJECTIVE_COUNT: usize = 2;
pub const FRONT_ARRAY_NAME: &str = "front";
pub const POPULATION_ARRAY_NAME: &str = "pop";

const STEM_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{name} must be 2-D, got {ndim} dimension(s)")]
    NotTwoDimensional { name: &'static str, ndim: usize },
    #[error("{name} row {row} has {found} values, expected {expected}")]
    RaggedRows {
        name: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("front must have 2 objective columns, got {0}")]
    ObjectiveCount(usize),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write array bundle {path}: {source}")]
    Bundle {
        path: PathBuf,
        #[source]
        source: NpzError,
    },
    #[error("failed to render image {path}: {message}")]
    Render { path: PathBuf, message: String },
}

impl ReportError {
    /// True for failures while writing artifacts, as opposed to bad input.
    pub fn is_io(&self) -> bool {
        !matches!(self, Self::Shape(_))
    }
}

/// Objective values of a Pareto front, one row per solution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParetoFront {
    objectives: Array2<f64>,
}

impl ParetoFront {
    pub fn new(objectives: Array2<f64>) -> Result<Self, ShapeError> {
        if objectives.ncols() != OBJECTIVE_COUNT {
            return Err(ShapeError::ObjectiveCount(objectives.ncols()));
        }
        Ok(Self { objectives })
    }

    pub fn from_dyn(values: ArrayD<f64>) -> Result<Self, ShapeError> {
        Self::new(into_two_d(FRONT_ARRAY_NAME, values)?)
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ShapeError> {
        Self::new(rows_to_array(FRONT_ARRAY_NAME, rows)?)
    }

    pub fn objectives(&self) -> ArrayView2<'_, f64> {
        self.objectives.view()
    }

    pub fn len(&self) -> usize {
        self.objectives.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points as they are shown on a plot.
    ///
    /// An objective whose values are all negative is assumed to be stored
    /// negated for minimization and is flipped back. One non-negative (or
    /// NaN) value keeps that axis as is. The stored front is not touched.
    pub fn display_points(&self) -> DisplayFront {
        let (xs, flip_x) = display_axis(self.objectives.column(0));
        let (ys, flip_y) = display_axis(self.objectives.column(1));
        DisplayFront {
            points: xs.into_iter().zip(ys).collect(),
            flipped: [flip_x, flip_y],
        }
    }
}

/// Decision-variable vectors that produced a front.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    variables: Array2<f64>,
}

impl Population {
    pub fn new(variables: Array2<f64>) -> Self {
        Self { variables }
    }

    pub fn from_dyn(values: ArrayD<f64>) -> Result<Self, ShapeError> {
        Ok(Self::new(into_two_d(POPULATION_ARRAY_NAME, values)?))
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ShapeError> {
        Ok(Self::new(rows_to_array(POPULATION_ARRAY_NAME, rows)?))
    }

    pub fn variables(&self) -> ArrayView2<'_, f64> {
        self.variables.view()
    }

    pub fn len(&self) -> usize {
        self.variables.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFront {
    pub points: Vec<(f64, f64)>,
    /// Whether the x and y axes were sign-flipped.
    pub flipped: [bool; 2],
}

impl DisplayFront {
    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|(x, _)| *x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|(_, y)| *y).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedPareto {
    pub bundle_path: PathBuf,
    pub image_path: PathBuf,
    pub display: DisplayFront,
}

/// `<experiment_name>_<YYYYMMDD_HHMMSS>`. Resolution is one second, so two
/// saves of the same experiment within a second share a stem.
pub fn artifact_stem<Tz>(experiment_name: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{experiment_name}_{}", at.format(STEM_TIMESTAMP_FORMAT))
}

/// Plots the front as a scatter joined by a line in ascending x order and
/// writes it as PNG to `out_path`.
pub fn plot_pareto(
    front: &ParetoFront,
    ctx: &RenderContext,
    out_path: &Path,
) -> Result<DisplayFront, ReportError> {
    let shown = front.display_points();
    warn_non_finite(&shown);
    ctx.draw_front(out_path, &shown, FrontierLine::SortedByX)?;

    info!(
        component = "pareto",
        event = "pareto.plot.saved",
        image_path = %out_path.display(),
        points = shown.points.len(),
        flipped = ?shown.flipped
    );
    Ok(shown)
}

/// Saves the raw front and population as `<stem>.npz` and a scatter plot as
/// `<stem>.png` in `config.output_dir`, stamped with the local time.
pub fn plot_and_save_pareto(
    front: &ParetoFront,
    population: &Population,
    experiment_name: &str,
    ctx: &RenderContext,
    config: &ReportConfig,
) -> Result<SavedPareto, ReportError> {
    plot_and_save_pareto_at(front, population, experiment_name, ctx, config, &Local::now())
}

/// Same as [`plot_and_save_pareto`] with an explicit timestamp for the
/// artifact names.
///
/// The bundle is written first. If the image fails afterwards the bundle is
/// left on disk.
pub fn plot_and_save_pareto_at<Tz>(
    front: &ParetoFront,
    population: &Population,
    experiment_name: &str,
    ctx: &RenderContext,
    config: &ReportConfig,
    at: &DateTime<Tz>,
) -> Result<SavedPareto, ReportError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if front.len() != population.len() {
        warn!(
            component = "pareto",
            event = "pareto.save.row_mismatch",
            experiment_name,
            front_rows = front.len(),
            population_rows = population.len()
        );
    }

    let stem = artifact_stem(experiment_name, at);
    let bundle_path = config.output_dir.join(format!("{stem}.npz"));
    let image_path = config.output_dir.join(format!("{stem}.png"));

    write_npz(
        &bundle_path,
        &[
            (FRONT_ARRAY_NAME, front.objectives()),
            (POPULATION_ARRAY_NAME, population.variables()),
        ],
    )
    .map_err(|source| match source {
        NpzError::Io(source) => ReportError::Io {
            path: bundle_path.clone(),
            source,
        },
        source => ReportError::Bundle {
            path: bundle_path.clone(),
            source,
        },
    })?;
    info!(
        component = "pareto",
        event = "pareto.bundle.saved",
        bundle_path = %bundle_path.display(),
        front_shape = ?front.objectives().dim(),
        population_shape = ?population.variables().dim()
    );

    let shown = front.display_points();
    warn_non_finite(&shown);
    ctx.draw_front(&image_path, &shown, FrontierLine::Hidden)?;
    info!(
        component = "pareto",
        event = "pareto.image.saved",
        image_path = %image_path.display(),
        dpi = ctx.style().dpi,
        flipped = ?shown.flipped
    );

    Ok(SavedPareto {
        bundle_path,
        image_path,
        display: shown,
    })
}

fn display_axis(values: ArrayView1<'_, f64>) -> (Vec<f64>, bool) {
    let flip = values.iter().all(|v| *v < 0.0);
    let shown = values
        .iter()
        .map(|v| if flip { -*v } else { *v })
        .collect();
    (shown, flip)
}

fn warn_non_finite(display: &DisplayFront) {
    let skipped = display
        .points
        .iter()
        .filter(|(x, y)| !x.is_finite() || !y.is_finite())
        .count();
    if skipped > 0 {
        warn!(
            component = "pareto",
            event = "pareto.plot.non_finite_skipped",
            skipped
        );
    }
}

fn into_two_d(name: &'static str, values: ArrayD<f64>) -> Result<Array2<f64>, ShapeError> {
    let ndim = values.ndim();
    values
        .into_dimensionality::<Ix2>()
        .map_err(|_| ShapeError::NotTwoDimensional { name, ndim })
}

fn rows_to_array(name: &'static str, rows: &[Vec<f64>]) -> Result<Array2<f64>, ShapeError> {
    let expected = rows.first().map(Vec::len).unwrap_or(0);
    if let Some((row, found)) = rows
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|(_, len)| *len != expected)
    {
        return Err(ShapeError::RaggedRows {
            name,
            row,
            expected,
            found,
        });
    }

    Ok(Array2::from_shape_fn((rows.len(), expected), |(i, j)| {
        rows[i][j]
    }))
}
