//! Cyclical calendar features derived from a timestamp column.
//!
//! Each periodic quantity is mapped onto the unit circle so that values on
//! either side of a period boundary stay close:
//! - half-hour of day, period 48
//! - day of month, period 31 (fixed, not calendar-aware)
//! - month of year, period 12

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{Column, ColumnKind, FrameError, TimeSeriesFrame};

pub const DEFAULT_TIME_COL: &str = "ds";

pub const HALFHOUR_PERIOD: f64 = 48.0;
pub const DAY_PERIOD: f64 = 31.0;
pub const MONTH_PERIOD: f64 = 12.0;

/// Output columns, in the order they are appended.
pub const CYCLICAL_COLUMNS: [&str; 6] = [
    "halfhour_sin",
    "halfhour_cos",
    "day_sin",
    "day_cos",
    "month_sin",
    "month_cos",
];

/// Names of intermediate calendar fields. A frame never keeps columns with
/// these names after the features are added.
pub const SCRATCH_COLUMNS: [&str; 3] = ["total_hours", "day", "month"];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("column {column} row {row}: cannot parse '{value}' as a timestamp")]
    Parse {
        column: String,
        row: usize,
        value: String,
    },
    #[error("column not found: {0}")]
    MissingColumn(String),
    #[error("column {column} has unsupported type {kind:?}")]
    UnsupportedColumnType { column: String, kind: ColumnKind },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclicalEncoding {
    pub halfhour_sin: f64,
    pub halfhour_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

impl CyclicalEncoding {
    pub fn from_datetime(ts: &NaiveDateTime) -> Self {
        let total_hours =
            ts.hour() as f64 + ts.minute() as f64 / 60.0 + ts.second() as f64 / 3600.0;
        let halfhour = total_hours * 2.0;
        let (halfhour_sin, halfhour_cos) = encode(halfhour, HALFHOUR_PERIOD);
        let (day_sin, day_cos) = encode(ts.day() as f64, DAY_PERIOD);
        let (month_sin, month_cos) = encode(ts.month() as f64, MONTH_PERIOD);

        Self {
            halfhour_sin,
            halfhour_cos,
            day_sin,
            day_cos,
            month_sin,
            month_cos,
        }
    }

    fn values(&self) -> [f64; 6] {
        [
            self.halfhour_sin,
            self.halfhour_cos,
            self.day_sin,
            self.day_cos,
            self.month_sin,
            self.month_cos,
        ]
    }
}

/// Adds the six cyclical columns to `frame` in place.
///
/// The timestamp column is coerced to [`Column::Timestamp`]. Columns named
/// like an output column are overwritten at their current position. Columns
/// named in [`SCRATCH_COLUMNS`] are removed unless one of them is `time_col`.
/// Everything else is kept. Missing timestamps produce missing features.
///
/// On error the frame is not modified.
pub fn add_cyclical_features(
    frame: &mut TimeSeriesFrame,
    time_col: &str,
) -> Result<(), FeatureError> {
    let column = frame
        .column(time_col)
        .ok_or_else(|| FeatureError::MissingColumn(time_col.to_string()))?;
    let timestamps = parse_timestamp_column(time_col, column)?;

    let mut outputs: [Vec<Option<f64>>; 6] =
        std::array::from_fn(|_| Vec::with_capacity(timestamps.len()));
    let mut missing = 0usize;
    for ts in &timestamps {
        match ts {
            Some(ts) => {
                let values = CyclicalEncoding::from_datetime(ts).values();
                for (out, value) in outputs.iter_mut().zip(values) {
                    out.push(Some(value));
                }
            }
            None => {
                missing += 1;
                for out in outputs.iter_mut() {
                    out.push(None);
                }
            }
        }
    }

    let rows = timestamps.len();
    frame.insert_column(time_col, Column::Timestamp(timestamps))?;
    for (name, values) in CYCLICAL_COLUMNS.iter().zip(outputs) {
        frame.insert_column(*name, Column::Float(values))?;
    }
    for scratch in SCRATCH_COLUMNS {
        if scratch != time_col && frame.drop_column(scratch).is_some() {
            debug!(
                component = "features",
                event = "features.cyclical.scratch_dropped",
                column = scratch
            );
        }
    }

    info!(
        component = "features",
        event = "features.cyclical.added",
        time_col,
        rows,
        missing_timestamps = missing
    );

    Ok(())
}

/// Parses one timestamp string. Offsets are honored by keeping the
/// wall-clock time of the given offset.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn parse_timestamp_column(
    name: &str,
    column: &Column,
) -> Result<Vec<Option<NaiveDateTime>>, FeatureError> {
    match column {
        Column::Timestamp(cells) => Ok(cells.clone()),
        Column::Text(cells) => {
            debug!(
                component = "features",
                event = "features.cyclical.parse_text",
                column = name,
                rows = cells.len()
            );
            cells
                .iter()
                .enumerate()
                .map(|(row, cell)| match cell.as_deref().map(str::trim) {
                    None | Some("") => Ok(None),
                    Some(raw) => parse_timestamp(raw)
                        .map(Some)
                        .ok_or_else(|| FeatureError::Parse {
                            column: name.to_string(),
                            row,
                            value: raw.to_string(),
                        }),
                })
                .collect()
        }
        Column::Float(_) => Err(FeatureError::UnsupportedColumnType {
            column: name.to_string(),
            kind: ColumnKind::Float,
        }),
    }
}

fn encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}
